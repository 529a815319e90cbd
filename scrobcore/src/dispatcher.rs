//! Routes an inbound webhook play to the configured sources

use std::sync::Arc;
use tracing::warn;

use crate::registry::{ClientRegistry, SourceRegistry};
use crate::{EntityType, PlayEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Number of sources whose `handle` was invoked
    Handled(usize),
    UnknownName,
    TypeMismatch,
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    sources: Arc<SourceRegistry>,
    clients: Arc<ClientRegistry>,
}

impl Dispatcher {
    pub fn new(sources: Arc<SourceRegistry>, clients: Arc<ClientRegistry>) -> Self {
        Self { sources, clients }
    }

    /// Hands `play` to the source named `explicit_name`, or to every source of `source_type`
    ///
    /// Sources are handled one after the other in registration order. A source
    /// whose handling fails is logged and the next one still runs.
    pub async fn handle_webhook(
        &self,
        source_type: EntityType,
        play: PlayEvent,
        explicit_name: Option<&str>,
    ) -> DispatchOutcome {
        let targets = match explicit_name {
            Some(name) => match self.sources.get_by_name(name) {
                None => {
                    warn!(
                        label = source_type.display(),
                        "{} event specified a config name but no configured source found: {}",
                        source_type.display(),
                        name
                    );
                    return DispatchOutcome::UnknownName;
                }
                Some(source) if source.entity_type() != source_type => {
                    warn!(
                        label = source_type.display(),
                        "{} event specified a config name but the configured source was not a {} type: {}",
                        source_type.display(),
                        source_type.display(),
                        name
                    );
                    return DispatchOutcome::TypeMismatch;
                }
                Some(source) => vec![source],
            },
            None => self.sources.get_by_type(source_type),
        };

        let mut handled = 0;
        for source in targets {
            let stamped = play.stamped(source.name(), source.entity_type());
            handled += 1;
            if let Err(e) = source.handle(stamped, &self.clients).await {
                warn!(label = source.name(), "Failed to handle {}: {}", play.summary(), e);
            }
        }
        DispatchOutcome::Handled(handled)
    }
}
