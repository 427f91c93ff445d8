//! Prometheus counters for action handling, transitions, and errors.
//! Scraped over the socket configured at `logging.prometheus_hook`.

use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, IntCounterVec};

lazy_static! {
    static ref ACTIONS_HANDLED: IntCounterVec = register_int_counter_vec!(
        "chatfsm_actions_handled_total",
        "actions routed through the state machine, by kind",
        &["kind"]
    )
    .unwrap();
    static ref TRANSITIONS: IntCounterVec = register_int_counter_vec!(
        "chatfsm_transitions_total",
        "state transitions performed, by destination state",
        &["to"]
    )
    .unwrap();
    static ref ERRORS: IntCounterVec = register_int_counter_vec!(
        "chatfsm_errors_total",
        "errors encountered, by error variant",
        &["kind"]
    )
    .unwrap();
}

pub fn count_action(kind: &str) {
    ACTIONS_HANDLED.with_label_values(&[kind]).inc();
}

pub fn count_transition(to: &str) {
    TRANSITIONS.with_label_values(&[to]).inc();
}

pub fn count_error(kind: &str) {
    ERRORS.with_label_values(&[kind]).inc();
}
