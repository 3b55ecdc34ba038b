use std::time::Duration;

const DEFAULT_WRITE_WAIT: Duration = Duration::from_secs(10);
const DEFAULT_PONG_WAIT: Duration = Duration::from_secs(60);
const DEFAULT_MAX_MESSAGE_BYTES: usize = 64 * 1024;
const DEFAULT_OUTBOUND_BUFFER: usize = 256;
const DEFAULT_HUB_BUFFER: usize = 1_024;

/// Transport tuning shared by every connection a [`crate::Server`] accepts.
#[derive(Clone, Debug, Default)]
pub struct WsConfig {
    /// Upper bound on a single frame write (text, ping or close).
    pub write_wait: Option<Duration>,
    /// Read deadline, extended on every pong.
    pub pong_wait: Option<Duration>,
    /// Defaults to 9/10 of the pong wait so a ping always lands before the deadline.
    pub ping_period: Option<Duration>,
    pub max_message_bytes: Option<usize>,
    pub outbound_buffer: Option<usize>,
    pub hub_buffer: Option<usize>,
}

impl WsConfig {
    pub fn write_wait(&self) -> Duration {
        non_zero(self.write_wait).unwrap_or(DEFAULT_WRITE_WAIT)
    }

    pub fn pong_wait(&self) -> Duration {
        non_zero(self.pong_wait).unwrap_or(DEFAULT_PONG_WAIT)
    }

    pub fn ping_period(&self) -> Duration {
        non_zero(self.ping_period).unwrap_or_else(|| self.pong_wait() * 9 / 10)
    }

    pub fn max_message_bytes(&self) -> usize {
        self.max_message_bytes
            .unwrap_or(DEFAULT_MAX_MESSAGE_BYTES)
            .max(1)
    }

    pub fn outbound_capacity(&self) -> usize {
        self.outbound_buffer.unwrap_or(DEFAULT_OUTBOUND_BUFFER).max(1)
    }

    pub fn hub_capacity(&self) -> usize {
        self.hub_buffer.unwrap_or(DEFAULT_HUB_BUFFER).max(1)
    }
}

fn non_zero(value: Option<Duration>) -> Option<Duration> {
    value.filter(|duration| !duration.is_zero())
}
