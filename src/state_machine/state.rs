//! A single registered state and the hook slots it may fill in.
//!
//! Hooks are stored as `Arc<dyn Fn(..) -> BoxFuture<..>>` trait objects
//! taking their arguments by value rather than by reference. A hook
//! that needs to hold a `&mut Context` across an `.await` runs into
//! Rust's higher-ranked trait bound limitations the moment it's stored
//! behind a `dyn Fn`; moving the context in and handing a (possibly
//! mutated) one back avoids that entirely and keeps every hook's
//! signature a plain, 'static future.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::gateway::ChatGateway;
use crate::state_machine::context::Context;
use crate::state_machine::types::{Action, CallbackPayload, ChatId, MessagePayload, StateCode};
use crate::static_loader::StaticLoader;
use crate::util::error::Result;

/// Common return shape for every hook: the context it leaves behind
/// (mutated or not) plus whatever the hook kind actually produces.
/// The context always comes back, even on error, so the machine can
/// still persist partial mutations before surfacing the failure.
pub struct HookReturn<T> {
    pub context: Context,
    pub result: Result<T>,
}

impl<T> HookReturn<T> {
    pub fn ok(context: Context, value: T) -> Self {
        Self {
            context,
            result: Ok(value),
        }
    }

    pub fn err(context: Context, err: crate::util::error::FsmError) -> Self {
        Self {
            context,
            result: Err(err),
        }
    }
}

pub type EnterExitHook =
    Arc<dyn Fn(ChatId, Context, Arc<dyn ChatGateway>, Arc<dyn StaticLoader>) -> BoxFuture<'static, HookReturn<()>> + Send + Sync>;

pub type MessageHook = Arc<
    dyn Fn(
            ChatId,
            Context,
            Arc<dyn ChatGateway>,
            Arc<dyn StaticLoader>,
            MessagePayload,
        ) -> BoxFuture<'static, HookReturn<()>>
        + Send
        + Sync,
>;

pub type CallbackHook = Arc<
    dyn Fn(
            ChatId,
            Context,
            Arc<dyn ChatGateway>,
            Arc<dyn StaticLoader>,
            CallbackPayload,
        ) -> BoxFuture<'static, HookReturn<()>>
        + Send
        + Sync,
>;

pub type AfterActionSwitchHook = Arc<
    dyn Fn(ChatId, Context, Action) -> BoxFuture<'static, HookReturn<Option<StateCode>>> + Send + Sync,
>;

pub type AfterEnterSwitchHook =
    Arc<dyn Fn(ChatId, Context) -> BoxFuture<'static, HookReturn<Option<StateCode>>> + Send + Sync>;

/// One node of the machine. Built with the consuming `with_*` setters
/// below, usually through the capability recipes in
/// [`crate::state_machine::capabilities`] rather than by hand.
#[derive(Clone)]
pub struct State {
    code: StateCode,
    pub(crate) on_enter: Option<EnterExitHook>,
    pub(crate) on_exit: Option<EnterExitHook>,
    pub(crate) message_handler: Option<MessageHook>,
    pub(crate) callback_handler: Option<CallbackHook>,
    pub(crate) after_action_switcher: Option<AfterActionSwitchHook>,
    pub(crate) after_enter_switcher: Option<AfterEnterSwitchHook>,
}

impl State {
    pub fn new(code: impl Into<StateCode>) -> Self {
        Self {
            code: code.into(),
            on_enter: None,
            on_exit: None,
            message_handler: None,
            callback_handler: None,
            after_action_switcher: None,
            after_enter_switcher: None,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// Explicit override always wins: a later call replaces whatever a
    /// capability recipe set earlier, matching the rule that a
    /// concrete state's own definition takes precedence over a mixed
    /// in default.
    pub fn with_on_enter<F>(mut self, f: F) -> Self
    where
        F: Fn(ChatId, Context, Arc<dyn ChatGateway>, Arc<dyn StaticLoader>) -> BoxFuture<'static, HookReturn<()>>
            + Send
            + Sync
            + 'static,
    {
        self.on_enter = Some(Arc::new(f));
        self
    }

    pub fn with_on_exit<F>(mut self, f: F) -> Self
    where
        F: Fn(ChatId, Context, Arc<dyn ChatGateway>, Arc<dyn StaticLoader>) -> BoxFuture<'static, HookReturn<()>>
            + Send
            + Sync
            + 'static,
    {
        self.on_exit = Some(Arc::new(f));
        self
    }

    pub fn with_message_handler<F>(mut self, f: F) -> Self
    where
        F: Fn(
                ChatId,
                Context,
                Arc<dyn ChatGateway>,
                Arc<dyn StaticLoader>,
                MessagePayload,
            ) -> BoxFuture<'static, HookReturn<()>>
            + Send
            + Sync
            + 'static,
    {
        self.message_handler = Some(Arc::new(f));
        self
    }

    pub fn with_callback_handler<F>(mut self, f: F) -> Self
    where
        F: Fn(
                ChatId,
                Context,
                Arc<dyn ChatGateway>,
                Arc<dyn StaticLoader>,
                CallbackPayload,
            ) -> BoxFuture<'static, HookReturn<()>>
            + Send
            + Sync
            + 'static,
    {
        self.callback_handler = Some(Arc::new(f));
        self
    }

    pub fn with_after_action_switcher<F>(mut self, f: F) -> Self
    where
        F: Fn(ChatId, Context, Action) -> BoxFuture<'static, HookReturn<Option<StateCode>>>
            + Send
            + Sync
            + 'static,
    {
        self.after_action_switcher = Some(Arc::new(f));
        self
    }

    pub fn with_after_enter_switcher<F>(mut self, f: F) -> Self
    where
        F: Fn(ChatId, Context) -> BoxFuture<'static, HookReturn<Option<StateCode>>> + Send + Sync + 'static,
    {
        self.after_enter_switcher = Some(Arc::new(f));
        self
    }

    pub(crate) async fn run_on_enter(
        &self,
        chat_id: ChatId,
        context: Context,
        gateway: Arc<dyn ChatGateway>,
        loader: Arc<dyn StaticLoader>,
    ) -> HookReturn<()> {
        match &self.on_enter {
            Some(hook) => hook(chat_id, context, gateway, loader).await,
            None => HookReturn::ok(context, ()),
        }
    }

    pub(crate) async fn run_on_exit(
        &self,
        chat_id: ChatId,
        context: Context,
        gateway: Arc<dyn ChatGateway>,
        loader: Arc<dyn StaticLoader>,
    ) -> HookReturn<()> {
        match &self.on_exit {
            Some(hook) => hook(chat_id, context, gateway, loader).await,
            None => HookReturn::ok(context, ()),
        }
    }

    pub(crate) fn has_message_handler(&self) -> bool {
        self.message_handler.is_some()
    }

    pub(crate) fn has_callback_handler(&self) -> bool {
        self.callback_handler.is_some()
    }

    pub(crate) async fn run_message_handler(
        &self,
        chat_id: ChatId,
        context: Context,
        gateway: Arc<dyn ChatGateway>,
        loader: Arc<dyn StaticLoader>,
        payload: MessagePayload,
    ) -> HookReturn<()> {
        match &self.message_handler {
            Some(hook) => hook(chat_id, context, gateway, loader, payload).await,
            None => HookReturn::ok(context, ()),
        }
    }

    pub(crate) async fn run_callback_handler(
        &self,
        chat_id: ChatId,
        context: Context,
        gateway: Arc<dyn ChatGateway>,
        loader: Arc<dyn StaticLoader>,
        payload: CallbackPayload,
    ) -> HookReturn<()> {
        match &self.callback_handler {
            Some(hook) => hook(chat_id, context, gateway, loader, payload).await,
            None => HookReturn::ok(context, ()),
        }
    }

    pub(crate) async fn run_after_action_switcher(
        &self,
        chat_id: ChatId,
        context: Context,
        action: Action,
    ) -> HookReturn<Option<StateCode>> {
        match &self.after_action_switcher {
            Some(hook) => hook(chat_id, context, action).await,
            None => HookReturn::ok(context, None),
        }
    }

    pub(crate) async fn run_after_enter_switcher(
        &self,
        chat_id: ChatId,
        context: Context,
    ) -> HookReturn<Option<StateCode>> {
        match &self.after_enter_switcher {
            Some(hook) => hook(chat_id, context).await,
            None => HookReturn::ok(context, None),
        }
    }
}
