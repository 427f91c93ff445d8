#![deny(rust_2018_idioms)]
//! Demo binary: wires up a tiny four-state bot (main menu -> profile
//! wizard -> profile done -> help) over a console transport, so the
//! machine can be exercised without a real chat transport or database.
//! Reads one action per line from stdin: ordinary text becomes an
//! `Action::Message`; a line of the form `/cb <data>` becomes an
//! `Action::CallbackQuery` carrying `<data>`, emulating an inline
//! button press.

use std::collections::HashMap;
use std::io::BufRead;
use std::sync::Arc;

use chatfsm::gateway::{ChatGateway, Keyboard, KeyboardButton, RecordingGateway};
use chatfsm::state_machine::capabilities::{
    choice_by_message, clear_context_on_exit, static_view, validate_on_message,
};
use chatfsm::state_machine::state::HookReturn;
use chatfsm::state_machine::{Action, State, StateRegistry};
use chatfsm::statics::{Args, ARGS};
use chatfsm::ChatFsmOpts;
use clap::Parser;
use futures::FutureExt;

const MAIN_MENU: &str = "main_menu";
const PROFILE_NAME: &str = "profile_name";
const PROFILE_DONE: &str = "profile_done";
const HELP: &str = "help";

fn build_registry() -> StateRegistry {
    let mut menu_options = HashMap::new();
    menu_options.insert("profile".to_owned(), PROFILE_NAME.to_owned());
    menu_options.insert("help".to_owned(), HELP.to_owned());

    let main_menu = choice_by_message(
        static_view(
            State::new(MAIN_MENU),
            "Welcome. Reply 'profile' to set your name or 'help' for info.",
            Keyboard::single_row([
                KeyboardButton::new("Profile", "profile"),
                KeyboardButton::new("Help", "help"),
            ]),
        ),
        menu_options,
    );

    let profile_name = validate_on_message(
        static_view(State::new(PROFILE_NAME), "What's your name?", Keyboard::empty()),
        |text| (!text.trim().is_empty()).then(|| text.trim().to_owned()),
        "invalid_name",
        |name, _chat_id, mut ctx| {
            async move {
                ctx.set("name", name);
                ctx.set("__profile_valid", true);
                HookReturn::ok(ctx, ())
            }
            .boxed()
        },
    )
    .with_after_action_switcher(|_chat_id, mut ctx, _action| {
        async move {
            let next = if ctx.remove("__profile_valid").is_some() {
                Some(PROFILE_DONE.to_owned())
            } else {
                None
            };
            HookReturn::ok(ctx, next)
        }
        .boxed()
    });

    let profile_done = clear_context_on_exit(
        static_view(
            State::new(PROFILE_DONE),
            "Saved. Press OK to return to the menu.",
            Keyboard::single_row([KeyboardButton::new("OK", "ack")]),
        )
        .with_callback_handler(|_chat_id, ctx, _gateway, _loader, _payload| async move { HookReturn::ok(ctx, ()) }.boxed()),
        vec!["name".to_owned()],
    )
    .with_after_action_switcher(|_chat_id, ctx, action| {
        async move {
            let next = matches!(&action, Action::CallbackQuery { data, .. } if data.as_str() == "ack")
                .then(|| MAIN_MENU.to_owned());
            HookReturn::ok(ctx, next)
        }
        .boxed()
    });

    let help = static_view(
        State::new(HELP),
        "This is a demo of a conversational state machine.",
        Keyboard::empty(),
    )
    .with_after_action_switcher(|_chat_id, ctx, _action| {
        async move { HookReturn::ok(ctx, Some(MAIN_MENU.to_owned())) }.boxed()
    });

    StateRegistry::builder()
        .state(main_menu)
        .state(profile_name)
        .state(profile_done)
        .state(help)
        .default_state(MAIN_MENU)
        .build()
        .expect("well formed demo registry")
}

/// Parses one line of console input into an `Action`: a `/cb <data>`
/// line synthesizes a `CallbackQuery`, anything else is a text message.
fn parse_line(chat_id: i64, line: &str) -> Action {
    match line.strip_prefix("/cb ") {
        Some(data) => Action::callback(chat_id, data.trim()),
        None => Action::message(chat_id, line),
    }
}

fn main() {
    ARGS.set(Args::parse()).ok();

    let gateway = RecordingGateway::new();
    let machine = ChatFsmOpts::new(build_registry())
        .gateway(gateway.clone() as Arc<dyn ChatGateway>)
        .build();

    let chat_id = 1;
    let stdin = std::io::stdin();
    chatfsm::statics::EXEC.block_on(async move {
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(_) => break,
            };
            if line.trim().is_empty() {
                continue;
            }
            machine
                .handle_action(parse_line(chat_id, &line))
                .await
                .expect("action handled");
            if let Some(sent) = gateway.last() {
                println!("bot> {}", sent.text);
            }
        }
    });
}
