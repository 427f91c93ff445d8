//! Drives a chat through the registered states: loads its persisted
//! state and context, dispatches an incoming action to the current
//! state's handler, runs any switcher hooks, and persists wherever it
//! lands. At most one action per chat runs at a time, enforced by
//! [`PerChatSerializer`].

use std::sync::Arc;

use crate::gateway::ChatGateway;
use crate::persist::StorageBackend;
use crate::state_machine::context::Context;
use crate::state_machine::registry::StateRegistry;
use crate::state_machine::serializer::PerChatSerializer;
use crate::state_machine::state::State;
use crate::state_machine::types::{Action, ChatId, StateCode};
use crate::static_loader::StaticLoader;
use crate::util::error::{FsmError, Result};

const DEFAULT_MAX_CHAIN_DEPTH: usize = 16;

/// Outcome of a step that may be contained per §7: either processing
/// continues with the wrapped value, or a hook/registry/chain-depth
/// failure was logged and persisted and the caller should stop, with
/// `handle_action` itself still returning `Ok(())`.
enum Flow<T> {
    Continue(T),
    Contained,
}

pub struct StateMachine {
    registry: Arc<StateRegistry>,
    storage: Arc<dyn StorageBackend>,
    gateway: Arc<dyn ChatGateway>,
    loader: Arc<dyn StaticLoader>,
    serializer: PerChatSerializer,
    max_chain_depth: usize,
}

impl StateMachine {
    pub fn new(
        registry: Arc<StateRegistry>,
        storage: Arc<dyn StorageBackend>,
        gateway: Arc<dyn ChatGateway>,
        loader: Arc<dyn StaticLoader>,
    ) -> Self {
        Self {
            registry,
            storage,
            gateway,
            loader,
            serializer: PerChatSerializer::new(),
            max_chain_depth: DEFAULT_MAX_CHAIN_DEPTH,
        }
    }

    pub fn with_max_chain_depth(mut self, max_chain_depth: usize) -> Self {
        self.max_chain_depth = max_chain_depth;
        self
    }

    /// Entry point: route `action` to the chat's current state,
    /// persisting whatever state/context it ends up in.
    pub async fn handle_action(&self, action: Action) -> Result<()> {
        let chat_id = action.chat_id();
        crate::metrics::count_action(action.kind());

        let registry = self.registry.clone();
        let storage = self.storage.clone();
        let gateway = self.gateway.clone();
        let loader = self.loader.clone();
        let max_chain_depth = self.max_chain_depth;

        self.serializer
            .with_lock(chat_id, move || async move {
                Self::handle_locked(&registry, &storage, &gateway, &loader, max_chain_depth, chat_id, action).await
            })
            .await
    }

    async fn handle_locked(
        registry: &StateRegistry,
        storage: &Arc<dyn StorageBackend>,
        gateway: &Arc<dyn ChatGateway>,
        loader: &Arc<dyn StaticLoader>,
        max_chain_depth: usize,
        chat_id: ChatId,
        action: Action,
    ) -> Result<()> {
        let mut budget = max_chain_depth;

        let context = Context::load(storage.get_context(chat_id).await?)?;
        let stored_code = storage.get_state(chat_id).await?;

        let (mut code, mut context) = match stored_code {
            Some(code) if registry.contains(&code) => (code, context),
            _ => {
                // Brand-new chat, or a persisted code that no longer
                // resolves (§3: an unresolvable code degrades to "treat
                // as if no state"). Either way, enter the default state
                // (and follow any after-enter chain) and stop there —
                // the action that triggered this is never dispatched to
                // a handler, it only brings the chat into the registry.
                let default = registry.default_state().to_owned();
                match Self::enter_chain(
                    registry, storage, gateway, loader, chat_id, default, context, &mut budget, max_chain_depth,
                )
                .await?
                {
                    Flow::Continue((_, context)) => {
                        storage.set_context(chat_id, context.snapshot()).await?;
                    }
                    Flow::Contained => {}
                }
                return Ok(());
            }
        };

        let state = registry.get(&code)?;
        let outcome = match &action {
            Action::Message { .. } if state.has_message_handler() => {
                let payload = action.as_message().expect("message action");
                state
                    .run_message_handler(chat_id, context, gateway.clone(), loader.clone(), payload)
                    .await
            }
            Action::CallbackQuery { .. } if state.has_callback_handler() => {
                let payload = action.as_callback().expect("callback action");
                state
                    .run_callback_handler(chat_id, context, gateway.clone(), loader.clone(), payload)
                    .await
            }
            _ => crate::state_machine::state::HookReturn::ok(context, ()),
        };
        context = outcome.context;
        if let Err(err) = outcome.result {
            return Self::contain(storage, chat_id, context, err).await;
        }

        let state = registry.get(&code)?;
        let switch = state
            .run_after_action_switcher(chat_id, context, action)
            .await;
        context = switch.context;
        let next = match switch.result {
            Ok(next) => next,
            Err(err) => return Self::contain(storage, chat_id, context, err).await,
        };

        if let Some(next) = next {
            if budget == 0 {
                return Self::contain(storage, chat_id, context, FsmError::ChainTooDeep(max_chain_depth)).await;
            }
            budget -= 1;
            match Self::transition(
                registry, storage, gateway, loader, chat_id, &code, next, context, &mut budget, max_chain_depth,
            )
            .await?
            {
                Flow::Continue((new_code, new_context)) => {
                    code = new_code;
                    context = new_context;
                }
                Flow::Contained => return Ok(()),
            }
        }

        storage.set_state(chat_id, &code).await?;
        storage.set_context(chat_id, context.snapshot()).await?;
        Ok(())
    }

    /// Logs a hook/registry/chain-depth failure, persists whatever
    /// context the chat ended up with, and swallows it: per §7, only
    /// `StorageError`/`SerializationError` reach `handle_action`'s
    /// caller — `RegistryError`, `TransitionCycleError` and
    /// `HandlerError` are contained inside the core.
    async fn contain(
        storage: &Arc<dyn StorageBackend>,
        chat_id: ChatId,
        context: Context,
        err: FsmError,
    ) -> Result<()> {
        err.record_stats();
        storage.set_context(chat_id, context.snapshot()).await?;
        Ok(())
    }

    /// Moves a chat from `from` to `to`: runs `from`'s exit hook, then
    /// enters `to` and follows its after-enter switcher chain. Per the
    /// normative algorithm, `to` is resolved in the registry *before*
    /// `from`'s exit hook runs, so an unknown target never leaves the
    /// chat having exited a state it can't re-enter.
    async fn transition(
        registry: &StateRegistry,
        storage: &Arc<dyn StorageBackend>,
        gateway: &Arc<dyn ChatGateway>,
        loader: &Arc<dyn StaticLoader>,
        chat_id: ChatId,
        from: &str,
        to: StateCode,
        context: Context,
        budget: &mut usize,
        max_chain_depth: usize,
    ) -> Result<Flow<(StateCode, Context)>> {
        if !registry.contains(&to) {
            Self::contain(storage, chat_id, context, FsmError::UnknownState(to)).await?;
            return Ok(Flow::Contained);
        }

        let from_state = registry.get(from)?;
        let exit = from_state
            .run_on_exit(chat_id, context, gateway.clone(), loader.clone())
            .await;
        let context = exit.context;
        if let Err(err) = exit.result {
            Self::contain(storage, chat_id, context, err).await?;
            return Ok(Flow::Contained);
        }

        Self::enter_chain(
            registry,
            storage,
            gateway,
            loader,
            chat_id,
            to,
            context,
            budget,
            max_chain_depth,
        )
        .await
    }

    /// Enters `code`, then follows `after_enter_switcher` hooks until
    /// one returns `None` or the chain budget runs out.
    ///
    /// Persists `state = code` after every successful `on_enter`, so a
    /// hook failure partway through a chain leaves storage pointed at
    /// the last state that actually finished entering rather than
    /// wherever the chain was headed. A switcher's target is resolved
    /// in the registry before the current state's exit hook runs, for
    /// the same reason as in [`Self::transition`].
    async fn enter_chain(
        registry: &StateRegistry,
        storage: &Arc<dyn StorageBackend>,
        gateway: &Arc<dyn ChatGateway>,
        loader: &Arc<dyn StaticLoader>,
        chat_id: ChatId,
        mut code: StateCode,
        mut context: Context,
        budget: &mut usize,
        max_chain_depth: usize,
    ) -> Result<Flow<(StateCode, Context)>> {
        loop {
            let state: &State = registry.get(&code)?;
            let entered = state
                .run_on_enter(chat_id, context, gateway.clone(), loader.clone())
                .await;
            context = entered.context;
            if let Err(err) = entered.result {
                Self::contain(storage, chat_id, context, err).await?;
                return Ok(Flow::Contained);
            }
            storage.set_state(chat_id, &code).await?;
            crate::metrics::count_transition(&code);

            let state: &State = registry.get(&code)?;
            let switch = state.run_after_enter_switcher(chat_id, context).await;
            context = switch.context;
            let next = match switch.result {
                Ok(next) => next,
                Err(err) => {
                    Self::contain(storage, chat_id, context, err).await?;
                    return Ok(Flow::Contained);
                }
            };

            match next {
                Some(next_code) if *budget > 0 => {
                    if !registry.contains(&next_code) {
                        Self::contain(storage, chat_id, context, FsmError::UnknownState(next_code)).await?;
                        return Ok(Flow::Contained);
                    }
                    *budget -= 1;
                    let exit_state: &State = registry.get(&code)?;
                    let exited = exit_state
                        .run_on_exit(chat_id, context, gateway.clone(), loader.clone())
                        .await;
                    context = exited.context;
                    if let Err(err) = exited.result {
                        Self::contain(storage, chat_id, context, err).await?;
                        return Ok(Flow::Contained);
                    }
                    code = next_code;
                }
                Some(_) => {
                    Self::contain(storage, chat_id, context, FsmError::ChainTooDeep(max_chain_depth)).await?;
                    return Ok(Flow::Contained);
                }
                None => return Ok(Flow::Continue((code, context))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use futures::FutureExt;

    use super::*;
    use crate::gateway::{Keyboard, RecordingGateway};
    use crate::persist::memory::InMemoryStorage;
    use crate::state_machine::capabilities::{
        choice_by_message, clear_context_on_exit, static_view, switch_state_by_enter,
    };
    use crate::static_loader::StaticMapLoader;

    const MAIN_MENU: &str = "MainMenu";
    const PROFILE: &str = "ProfileState";
    const HELP: &str = "HelpState";

    fn menu_switch_options() -> HashMap<String, StateCode> {
        let mut options = HashMap::new();
        options.insert("Profile".to_owned(), PROFILE.to_owned());
        options.insert("Help".to_owned(), HELP.to_owned());
        options
    }

    fn harness(
        registry: StateRegistry,
    ) -> (Arc<StateMachine>, Arc<InMemoryStorage>, Arc<RecordingGateway>) {
        let storage = Arc::new(InMemoryStorage::new());
        let gateway = RecordingGateway::new();
        let loader: Arc<dyn StaticLoader> = Arc::new(StaticMapLoader::default());
        let machine = Arc::new(StateMachine::new(
            Arc::new(registry),
            storage.clone() as Arc<dyn StorageBackend>,
            gateway.clone() as Arc<dyn ChatGateway>,
            loader,
        ));
        (machine, storage, gateway)
    }

    #[tokio::test]
    async fn fresh_chat_enters_default_state_without_dispatching() {
        let registry = StateRegistry::builder()
            .state(static_view(State::new(MAIN_MENU), "welcome", Keyboard::empty()))
            .default_state(MAIN_MENU)
            .build()
            .unwrap();
        let (machine, storage, gateway) = harness(registry);

        machine
            .handle_action(Action::message(42, "/start"))
            .await
            .unwrap();

        assert_eq!(
            storage.get_state(42).await.unwrap(),
            Some(MAIN_MENU.to_owned())
        );
        let sent = gateway.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].text, "welcome");
    }

    #[tokio::test]
    async fn choice_accepted_transitions_state() {
        let main_menu = choice_by_message(State::new(MAIN_MENU), menu_switch_options());
        let profile = State::new(PROFILE);
        let help = State::new(HELP);
        let registry = StateRegistry::builder()
            .state(main_menu)
            .state(profile)
            .state(help)
            .default_state(MAIN_MENU)
            .build()
            .unwrap();
        let (machine, storage, _gateway) = harness(registry);

        // First contact just enters MainMenu.
        machine
            .handle_action(Action::message(7, "/start"))
            .await
            .unwrap();
        assert_eq!(storage.get_state(7).await.unwrap(), Some(MAIN_MENU.to_owned()));

        machine
            .handle_action(Action::message(7, "Profile"))
            .await
            .unwrap();
        assert_eq!(storage.get_state(7).await.unwrap(), Some(PROFILE.to_owned()));
    }

    #[tokio::test]
    async fn invalid_choice_stays_put_but_still_persists_context() {
        let main_menu = choice_by_message(State::new(MAIN_MENU), menu_switch_options());
        let registry = StateRegistry::builder()
            .state(main_menu)
            .state(State::new(PROFILE))
            .state(State::new(HELP))
            .default_state(MAIN_MENU)
            .build()
            .unwrap();
        let (machine, storage, gateway) = harness(registry);

        machine
            .handle_action(Action::message(7, "/start"))
            .await
            .unwrap();
        gateway.clear();

        machine
            .handle_action(Action::message(7, "xyz"))
            .await
            .unwrap();

        assert_eq!(storage.get_state(7).await.unwrap(), Some(MAIN_MENU.to_owned()));
        let sent = gateway.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].text, "Lorem ipsum dolor sit amet, consectetur adipiscing elit.");
    }

    #[tokio::test]
    async fn chained_enter_runs_both_on_enters_and_only_first_on_exit() {
        const STATE_A: &str = "A";
        const STATE_B: &str = "B";

        let log: Arc<std::sync::Mutex<Vec<&'static str>>> = Arc::new(std::sync::Mutex::new(Vec::new()));

        let log_enter_a = log.clone();
        let log_exit_a = log.clone();
        let log_enter_b = log.clone();

        let state_a = switch_state_by_enter(
            State::new(STATE_A)
                .with_on_enter(move |_chat_id, ctx, _gateway, _loader| {
                    let log = log_enter_a.clone();
                    async move {
                        log.lock().unwrap().push("enter_a");
                        crate::state_machine::state::HookReturn::ok(ctx, ())
                    }
                    .boxed()
                })
                .with_on_exit(move |_chat_id, ctx, _gateway, _loader| {
                    let log = log_exit_a.clone();
                    async move {
                        log.lock().unwrap().push("exit_a");
                        crate::state_machine::state::HookReturn::ok(ctx, ())
                    }
                    .boxed()
                }),
            |_chat_id, _ctx| Some(STATE_B.to_owned()),
        );

        let state_b = State::new(STATE_B).with_on_enter(move |_chat_id, ctx, _gateway, _loader| {
            let log = log_enter_b.clone();
            async move {
                log.lock().unwrap().push("enter_b");
                crate::state_machine::state::HookReturn::ok(ctx, ())
            }
            .boxed()
        });

        let registry = StateRegistry::builder()
            .state(state_a)
            .state(state_b)
            .default_state(STATE_A)
            .build()
            .unwrap();
        let (machine, storage, _gateway) = harness(registry);

        machine
            .handle_action(Action::message(1, "/start"))
            .await
            .unwrap();

        assert_eq!(storage.get_state(1).await.unwrap(), Some(STATE_B.to_owned()));
        assert_eq!(*log.lock().unwrap(), vec!["enter_a", "exit_a", "enter_b"]);
    }

    #[tokio::test]
    async fn clear_context_on_exit_removes_only_listed_keys() {
        const WIZARD: &str = "Wizard";
        const DONE: &str = "Done";

        let wizard = clear_context_on_exit(
            State::new(WIZARD).with_after_action_switcher(|_chat_id, ctx, _action| {
                async move { crate::state_machine::state::HookReturn::ok(ctx, Some(DONE.to_owned())) }.boxed()
            }),
            vec!["draft".to_owned(), "step".to_owned()],
        );
        let done = State::new(DONE);

        let registry = StateRegistry::builder()
            .state(wizard)
            .state(done)
            .default_state(WIZARD)
            .build()
            .unwrap();
        let (machine, storage, _gateway) = harness(registry);

        machine
            .handle_action(Action::message(9, "/start"))
            .await
            .unwrap();
        storage
            .set_context(
                9,
                serde_json::json!({ "draft": "x", "step": 2, "lang": "en" }),
            )
            .await
            .unwrap();

        machine
            .handle_action(Action::message(9, "go"))
            .await
            .unwrap();

        assert_eq!(
            storage.get_context(9).await.unwrap(),
            serde_json::json!({ "lang": "en" })
        );
        assert_eq!(storage.get_state(9).await.unwrap(), Some(DONE.to_owned()));
    }

    #[tokio::test]
    async fn concurrent_chats_progress_independently_and_lock_map_drains() {
        let registry = StateRegistry::builder()
            .state(State::new(MAIN_MENU))
            .default_state(MAIN_MENU)
            .build()
            .unwrap();
        let (machine, storage, _gateway) = harness(registry);

        let m1 = machine.clone();
        let m2 = machine.clone();
        let (r1, r2) = tokio::join!(
            m1.handle_action(Action::message(1, "hi")),
            m2.handle_action(Action::message(2, "hi")),
        );
        r1.unwrap();
        r2.unwrap();

        assert_eq!(storage.get_state(1).await.unwrap(), Some(MAIN_MENU.to_owned()));
        assert_eq!(storage.get_state(2).await.unwrap(), Some(MAIN_MENU.to_owned()));
        assert_eq!(machine.serializer.len(), 0);

        // Two rapid actions for the same chat still observe transport order.
        machine
            .handle_action(Action::message(1, "first"))
            .await
            .unwrap();
        machine
            .handle_action(Action::message(1, "second"))
            .await
            .unwrap();
        assert_eq!(machine.serializer.len(), 0);
    }

    #[tokio::test]
    async fn cyclic_after_enter_switcher_is_bounded_by_chain_depth() {
        const LOOPY: &str = "Loopy";

        let loopy = switch_state_by_enter(State::new(LOOPY), |_chat_id, _ctx| Some(LOOPY.to_owned()));
        let registry = StateRegistry::builder()
            .state(loopy)
            .default_state(LOOPY)
            .build()
            .unwrap();

        let storage = Arc::new(InMemoryStorage::new());
        let gateway = RecordingGateway::new();
        let loader: Arc<dyn StaticLoader> = Arc::new(StaticMapLoader::default());
        let machine = StateMachine::new(
            Arc::new(registry),
            storage.clone() as Arc<dyn StorageBackend>,
            gateway.clone() as Arc<dyn ChatGateway>,
            loader,
        )
        .with_max_chain_depth(4);

        // A transition-cycle error is contained per §7: the caller still
        // sees `Ok(())`, not an `Err`. State is persisted at the point
        // the depth limit was hit (here, still `Loopy`, since every
        // step in the cycle re-enters the same code).
        machine
            .handle_action(Action::message(1, "/start"))
            .await
            .unwrap();
        assert_eq!(storage.get_state(1).await.unwrap(), Some(LOOPY.to_owned()));
    }

    #[tokio::test]
    async fn handler_error_is_contained_context_persisted_no_transition() {
        const BROKEN: &str = "Broken";

        let broken = State::new(BROKEN)
            .with_message_handler(|_chat_id, mut ctx, _gateway, _loader, _payload| {
                async move {
                    ctx.set("seen", true);
                    crate::state_machine::state::HookReturn::<()>::err(
                        ctx,
                        crate::state_machine::capabilities::invalid_input_err("nope"),
                    )
                }
                .boxed()
            })
            .with_after_action_switcher(|_chat_id, ctx, _action| {
                async move { crate::state_machine::state::HookReturn::ok(ctx, Some(HELP.to_owned())) }.boxed()
            });
        let registry = StateRegistry::builder()
            .state(broken)
            .state(State::new(HELP))
            .default_state(BROKEN)
            .build()
            .unwrap();
        let (machine, storage, _gateway) = harness(registry);

        machine
            .handle_action(Action::message(5, "/start"))
            .await
            .unwrap();

        // The erroring message handler still runs, but the machine
        // returns Ok(()) and never consults the after_action_switcher
        // that would have moved the chat to HELP.
        machine.handle_action(Action::message(5, "hi")).await.unwrap();

        assert_eq!(storage.get_state(5).await.unwrap(), Some(BROKEN.to_owned()));
        assert_eq!(
            storage.get_context(5).await.unwrap(),
            serde_json::json!({ "seen": true })
        );
    }

    #[tokio::test]
    async fn after_action_switcher_unknown_code_is_contained_without_exiting_current_state() {
        const START: &str = "Start";

        let log: Arc<std::sync::Mutex<Vec<&'static str>>> = Arc::new(std::sync::Mutex::new(Vec::new()));
        let log_exit = log.clone();

        let start = State::new(START)
            .with_on_exit(move |_chat_id, ctx, _gateway, _loader| {
                let log = log_exit.clone();
                async move {
                    log.lock().unwrap().push("exit_start");
                    crate::state_machine::state::HookReturn::ok(ctx, ())
                }
                .boxed()
            })
            .with_after_action_switcher(|_chat_id, ctx, _action| {
                async move { crate::state_machine::state::HookReturn::ok(ctx, Some("NoSuchState".to_owned())) }.boxed()
            });
        let registry = StateRegistry::builder()
            .state(start)
            .default_state(START)
            .build()
            .unwrap();
        let (machine, storage, _gateway) = harness(registry);

        machine
            .handle_action(Action::message(3, "/start"))
            .await
            .unwrap();

        machine.handle_action(Action::message(3, "go")).await.unwrap();

        // The target never resolved, so Start's on_exit must never run,
        // and the chat is still parked on Start.
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(storage.get_state(3).await.unwrap(), Some(START.to_owned()));
    }

    #[tokio::test]
    async fn callback_query_dispatches_to_callback_handler() {
        const ACKABLE: &str = "Ackable";

        let log: Arc<std::sync::Mutex<Vec<String>>> = Arc::new(std::sync::Mutex::new(Vec::new()));
        let log_cb = log.clone();

        let ackable = State::new(ACKABLE).with_callback_handler(move |_chat_id, ctx, _gateway, _loader, payload| {
            let log = log_cb.clone();
            async move {
                log.lock().unwrap().push(payload.data.clone());
                crate::state_machine::state::HookReturn::ok(ctx, ())
            }
            .boxed()
        });
        let registry = StateRegistry::builder()
            .state(ackable)
            .default_state(ACKABLE)
            .build()
            .unwrap();
        let (machine, storage, _gateway) = harness(registry);

        // First contact just enters Ackable, without dispatching.
        machine
            .handle_action(Action::message(1, "/start"))
            .await
            .unwrap();
        assert!(log.lock().unwrap().is_empty());

        machine
            .handle_action(Action::callback(1, "ack"))
            .await
            .unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["ack".to_owned()]);
        assert_eq!(storage.get_state(1).await.unwrap(), Some(ACKABLE.to_owned()));
    }
}
