use crate::peer::ConnectionState;

/// The presentation layer the viewer reports to.
pub trait ViewerUi: Send + Sync + 'static {
    fn on_connection_indicator(&self, state: ConnectionState);
    fn on_viewer_count(&self, count: u64);
}

/// Reports everything to the log.
#[derive(Debug, Default)]
pub struct ConsoleUi;

impl ViewerUi for ConsoleUi {
    fn on_connection_indicator(&self, state: ConnectionState) {
        let name: &'static str = state.into();
        match state.indicator_color() {
            Some(color) => info!("Connection {} ({})", name, color),
            None => info!("Connection {}", name),
        }
    }

    fn on_viewer_count(&self, count: u64) {
        info!("{} connected viewers", count);
    }
}
