//! Outbound port for engine events (notifiers, persistence, dashboards).

use crate::domain::error::ConfluenceError;
use crate::domain::events::EngineEvent;

pub trait EventSink {
    fn emit(&mut self, event: &EngineEvent) -> Result<(), ConfluenceError>;

    fn flush(&mut self) -> Result<(), ConfluenceError> {
        Ok(())
    }
}
