use std::fmt::{self, Write};

use chrono::Local;
use tracing::{
    Event, Subscriber,
    field::{Field, Visit},
};
use tracing_subscriber::{Layer, layer::Context};

use super::{LiveLog, LogLine};

/// Layer feeding formatted events into a [`LiveLog`]
///
/// Lines read `<timestamp> <level> : [<label>] <message> <fields>`. The label
/// is the `label` field of the event, or its target.
pub struct LiveLogLayer {
    live: LiveLog,
}

impl LiveLogLayer {
    pub fn new(live: LiveLog) -> Self {
        Self { live }
    }
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    label: Option<String>,
    fields: String,
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message.push_str(value),
            "label" => self.label = Some(value.to_string()),
            name => {
                let _ = write!(self.fields, " {}={}", name, value);
            }
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        match field.name() {
            "message" => {
                let _ = write!(self.message, "{:?}", value);
            }
            "label" => self.label = Some(format!("{:?}", value)),
            name => {
                let _ = write!(self.fields, " {}={:?}", name, value);
            }
        }
    }
}

impl<S: Subscriber> Layer<S> for LiveLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);

        let label = visitor
            .label
            .unwrap_or_else(|| metadata.target().to_string());
        let text = format!(
            "{} {:<5} : [{}] {}{}",
            Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z"),
            metadata.level().as_str().to_lowercase(),
            label,
            visitor.message,
            visitor.fields
        );

        self.live.push(LogLine::new(*metadata.level(), text));
    }
}
