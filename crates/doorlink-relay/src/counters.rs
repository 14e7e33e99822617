//! Relay counters.
//!
//! Counters are emitted through the `metrics` facade and cost nothing until a
//! recorder is installed. Call [`describe_metrics`] once after installing one.

use metrics::describe_counter;

/// A named counter with its description.
#[derive(Debug, Clone, Copy)]
pub struct Counter {
    pub name: &'static str,
    pub description: &'static str,
    /// Expected label keys.
    pub labels: &'static [&'static str],
}

impl Counter {
    const fn new(name: &'static str, description: &'static str) -> Self {
        Counter {
            name,
            description,
            labels: &[],
        }
    }

    const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Register the description with the installed recorder.
    pub fn describe(&self) {
        describe_counter!(self.name, self.description);
    }
}

/// Label key naming which side a line came from or went to.
pub const PEER_LABEL: &str = "peer";

pub mod metric_defs {
    use super::{Counter, PEER_LABEL};

    pub const LINES_RECEIVED: Counter =
        Counter::new("doorlink.relay.lines_received", "Lines read from a peer")
            .with_labels(&[PEER_LABEL]);

    pub const LINES_DISCARDED: Counter = Counter::new(
        "doorlink.relay.lines_discarded",
        "Lines dropped as undecodable or missing required keys",
    )
    .with_labels(&[PEER_LABEL]);

    pub const HISTORY_APPENDS: Counter = Counter::new(
        "doorlink.relay.history_appends",
        "Device events persisted to history",
    );

    pub const HISTORY_FAILURES: Counter = Counter::new(
        "doorlink.relay.history_failures",
        "Device events dropped because history could not be written",
    );

    pub const MIRROR_FAILURES: Counter = Counter::new(
        "doorlink.relay.mirror_failures",
        "Committed events the daily log could not take",
    );

    pub const FORWARDS: Counter =
        Counter::new("doorlink.relay.forwards", "Messages forwarded verbatim to the other peer")
            .with_labels(&[PEER_LABEL]);

    pub const CLIENT_CONNECTIONS: Counter = Counter::new(
        "doorlink.relay.client_connections",
        "Control-client connections accepted",
    );

    pub const DEVICE_RECONNECTS: Counter = Counter::new(
        "doorlink.relay.device_reconnects",
        "Successful reopenings of the device channel",
    );

    pub const ALL: &[Counter] = &[
        LINES_RECEIVED,
        LINES_DISCARDED,
        HISTORY_APPENDS,
        HISTORY_FAILURES,
        MIRROR_FAILURES,
        FORWARDS,
        CLIENT_CONNECTIONS,
        DEVICE_RECONNECTS,
    ];
}

/// Describe every relay counter.
pub fn describe_metrics() {
    for counter in metric_defs::ALL {
        counter.describe();
    }
}
