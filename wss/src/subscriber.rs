use crate::connection::Client;

/// Receives connection lifecycle events from the hub.
///
/// Callbacks run inline on the hub loop, in subscription order. They must
/// return quickly; anything that awaits belongs on a task the subscriber owns.
pub trait Subscriber<T>: Send + Sync + 'static {
    fn on_connect(&self, client: &Client<T>);

    fn on_disconnect(&self, client: &Client<T>);

    fn on_message(&self, client: &Client<T>, message: &[u8]);
}
