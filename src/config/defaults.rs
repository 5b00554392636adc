use std::time::Duration;

pub(super) const fn default_batch_size_limit() -> usize {
    super::DEFAULT_BATCH_SIZE_LIMIT
}

pub(super) const fn default_period() -> Duration {
    super::DEFAULT_PERIOD
}

pub(super) const fn default_shutdown_timeout() -> Duration {
    super::DEFAULT_SHUTDOWN_TIMEOUT
}

pub(super) const fn default_request_timeout() -> Duration {
    super::DEFAULT_HTTP_TIMEOUT
}

pub(super) const fn default_connect_timeout() -> Duration {
    super::DEFAULT_CONNECT_TIMEOUT
}

pub(super) const fn default_render_properties() -> bool {
    true
}

pub(super) fn default_minimum_level() -> String {
    "verbose".to_string()
}
