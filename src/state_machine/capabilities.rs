//! Reusable hook recipes, one per capability a state can mix in.
//!
//! Each function takes a [`State`] and returns it with one or more
//! hook slots filled in. They compose by chaining: `State::new("x")
//! .pipe(rendered_view(...)).pipe(clear_context_on_exit(...))` style
//! calls, though since these are plain functions the natural form is
//! `clear_context_on_exit(rendered_view(State::new("x"), ...), ...)`.

use std::collections::HashMap;
use std::sync::Arc;

use futures::FutureExt;

use crate::gateway::Keyboard;
use crate::state_machine::context::Context;
use crate::state_machine::state::{HookReturn, State};
use crate::state_machine::types::{ChatId, StateCode};
use crate::util::error::FsmError;

pub type RenderTextFn = Arc<dyn Fn(ChatId, &Context) -> String + Send + Sync>;
pub type RenderKeyboardFn = Arc<dyn Fn(ChatId, &Context) -> Keyboard + Send + Sync>;

/// Renders a view by calling `render_text`/`render_keyboard` against
/// the current context on entry and sending the result through the
/// gateway. The render functions are synchronous: they're pure
/// projections of already-loaded context, not a place to do I/O.
pub fn rendered_view(state: State, render_text: RenderTextFn, render_keyboard: RenderKeyboardFn) -> State {
    state.with_on_enter(move |chat_id, ctx, gateway, _loader| {
        let render_text = render_text.clone();
        let render_keyboard = render_keyboard.clone();
        async move {
            let text = render_text(chat_id, &ctx);
            let keyboard = render_keyboard(chat_id, &ctx);
            match gateway.send_message(chat_id, &text, Some(keyboard)).await {
                Ok(()) => HookReturn::ok(ctx, ()),
                Err(err) => HookReturn::err(ctx, err),
            }
        }
        .boxed()
    })
}

/// Renders a fixed view: same text and keyboard on every entry,
/// regardless of context. The common case for menus and static info
/// screens.
pub fn static_view(state: State, text: impl Into<String>, keyboard: Keyboard) -> State {
    let text: Arc<str> = Arc::from(text.into());
    let keyboard = Arc::new(keyboard);
    let text_fn: RenderTextFn = {
        let text = text.clone();
        Arc::new(move |_chat_id, _ctx: &Context| text.to_string())
    };
    let keyboard_fn: RenderKeyboardFn = {
        let keyboard = keyboard.clone();
        Arc::new(move |_chat_id, _ctx: &Context| (*keyboard).clone())
    };
    rendered_view(state, text_fn, keyboard_fn)
}

/// Validates an incoming message with `validator`, running
/// `on_correct` when it accepts and sending `invalid_text_key`'s
/// looked-up copy back to the chat when it rejects. `validator` is
/// synchronous by design: validating a string shouldn't need to await
/// anything, and keeping it sync lets it run without cloning the
/// context into the closure.
pub fn validate_on_message<T, V, C, CFut>(
    state: State,
    validator: V,
    invalid_text_key: impl Into<String>,
    on_correct: C,
) -> State
where
    T: Send + 'static,
    V: Fn(&str) -> Option<T> + Send + Sync + 'static,
    C: Fn(T, ChatId, Context) -> CFut + Send + Sync + 'static,
    CFut: std::future::Future<Output = HookReturn<()>> + Send + 'static,
{
    let invalid_text_key = invalid_text_key.into();
    let on_correct = Arc::new(on_correct);
    state.with_message_handler(move |chat_id, ctx, gateway, loader, payload| {
        let value = validator(&payload.text);
        if let Some(value) = value {
            let on_correct = on_correct.clone();
            async move { on_correct(value, chat_id, ctx).await }.boxed()
        } else {
            let invalid_text_key = invalid_text_key.clone();
            async move {
                let text = loader.get(&invalid_text_key).await;
                match gateway.send_message(chat_id, &text, None).await {
                    Ok(()) => HookReturn::ok(ctx, ()),
                    Err(err) => HookReturn::err(ctx, err),
                }
            }
            .boxed()
        }
    })
}

/// Restricts incoming messages to a fixed set of choices and, when the
/// message text matches one, both acknowledges it and arranges the
/// transition via [`switch_state_by_message`]. Apply both recipes to
/// the same state: this one validates, `switch_state_by_message`
/// performs the actual switch once the message handler has accepted
/// it.
pub fn choice_by_message(state: State, options: HashMap<String, StateCode>) -> State {
    let choice_keys: Vec<String> = options.keys().cloned().collect();
    let state = state.with_message_handler(move |chat_id, ctx, gateway, loader, payload| {
        let choice_keys = choice_keys.clone();
        async move {
            if choice_keys.iter().any(|k| k == &payload.text) {
                return HookReturn::ok(ctx, ());
            }
            let text = loader.get("invalid_choice").await;
            match gateway.send_message(chat_id, &text, None).await {
                Ok(()) => HookReturn::ok(ctx, ()),
                Err(err) => HookReturn::err(ctx, err),
            }
        }
        .boxed()
    });
    switch_state_by_message(state, options)
}

/// Switches state after handling a message whose text exactly matches
/// one of `options`'s keys, moving to the corresponding state code.
/// Non-matching text, or any other kind of action, leaves the chat
/// where it is.
pub fn switch_state_by_message(state: State, options: HashMap<String, StateCode>) -> State {
    state.with_after_action_switcher(move |_chat_id, ctx, action| {
        let target = action
            .as_message()
            .and_then(|payload| options.get(&payload.text).cloned());
        async move { HookReturn::ok(ctx, target) }.boxed()
    })
}

/// Switches state once, right after entering, without waiting for an
/// incoming action. `decide` inspects the context synchronously and
/// returns the next state code, or `None` to stay put.
pub fn switch_state_by_enter<F>(state: State, decide: F) -> State
where
    F: Fn(ChatId, &Context) -> Option<StateCode> + Send + Sync + 'static,
{
    state.with_after_enter_switcher(move |chat_id, ctx| {
        let next = decide(chat_id, &ctx);
        async move { HookReturn::ok(ctx, next) }.boxed()
    })
}

/// Clears the listed context keys on exit. An empty `keys` is a true
/// no-op — pass the exact scratch keys a wizard wrote that shouldn't
/// leak into whatever comes after.
pub fn clear_context_on_exit(state: State, keys: Vec<String>) -> State {
    state.with_on_exit(move |_chat_id, mut ctx, _gateway, _loader| {
        let keys = keys.clone();
        async move {
            ctx.clear_keys(keys.iter().map(String::as_str));
            HookReturn::<()>::ok(ctx, ())
        }
        .boxed()
    })
}

/// Narrows a handler-level error for validators/hooks that want to
/// reject without constructing a full [`FsmError`] by hand.
pub fn invalid_input_err(message: impl ToString) -> FsmError {
    FsmError::handler(message)
}
