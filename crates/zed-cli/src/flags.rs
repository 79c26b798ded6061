//! Global connection and transport flags.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use zed_client::TransportOptions;
use zed_config::ConnectionFlags;

/// Flags accepted by every command.
///
/// Connection flags overlay the selected context with precedence
/// flag-changed > stored > default; the tri-state booleans stay unset
/// unless the user typed them.
#[derive(Debug, Args)]
pub(crate) struct GlobalArgs {
    /// Endpoint of the permissions service (host:port)
    #[arg(long, global = true)]
    pub(crate) endpoint: Option<String>,

    /// Bearer token presented to the service
    #[arg(long, global = true)]
    pub(crate) token: Option<String>,

    /// Path to a PEM bundle with the service's certificate authority
    #[arg(long, global = true)]
    pub(crate) certificate_path: Option<PathBuf>,

    /// Dial without TLS
    #[arg(
        long,
        global = true,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    pub(crate) insecure: Option<bool>,

    /// Dial with TLS but do not verify the certificate
    #[arg(
        long,
        global = true,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    pub(crate) no_verify_ca: Option<bool>,

    /// Present this server name during the TLS handshake instead of the
    /// dialed host
    #[arg(long, global = true)]
    pub(crate) hostname_override: Option<String>,

    /// HTTP proxy URL to tunnel the connection through
    #[arg(long, global = true)]
    pub(crate) proxy: Option<String>,

    /// Attempt budget for retryable calls
    #[arg(long, global = true, default_value_t = 5)]
    pub(crate) max_retries: u32,

    /// Maximum gRPC message size in bytes
    #[arg(long, global = true, default_value_t = 4 * 1024 * 1024)]
    pub(crate) max_message_size: usize,

    /// Extra request metadata as key=value (repeatable)
    #[arg(long = "extra-header", global = true)]
    pub(crate) extra_headers: Vec<String>,

    /// Value stamped as x-request-id on every request
    #[arg(long, global = true)]
    pub(crate) request_id: Option<String>,

    /// Log filter (e.g. info, debug, zed_client=trace)
    #[arg(long, global = true, default_value = "warn")]
    pub(crate) log_level: String,

    /// Skip the server version handshake
    #[arg(long, global = true)]
    pub(crate) skip_version_check: bool,
}

impl GlobalArgs {
    /// The connection overlay for the context resolver.
    pub(crate) fn connection_flags(&self) -> ConnectionFlags {
        ConnectionFlags {
            endpoint: self.endpoint.clone(),
            token: self.token.clone(),
            certificate_path: self.certificate_path.clone(),
            insecure: self.insecure,
            no_verify_ca: self.no_verify_ca,
        }
    }

    /// The transport knobs for the channel builder.
    pub(crate) fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            hostname_override: self.hostname_override.clone(),
            proxy: self.proxy.clone(),
            max_message_size: self.max_message_size,
            max_retries: self.max_retries,
            extra_headers: self.extra_headers.clone(),
            request_id: self.request_id.clone(),
            skip_version_check: self.skip_version_check,
            connect_timeout: Duration::from_secs(10),
            keepalive_interval: Duration::from_secs(30),
            keepalive_timeout: Duration::from_secs(10),
        }
    }
}

/// The consistency flag set shared by query commands.
#[derive(Debug, Args, Default)]
pub(crate) struct ConsistencyFlags {
    /// Evaluate at the head revision
    #[arg(long = "consistency-full")]
    pub(crate) full: bool,

    /// Evaluate at least as fresh as this change token
    #[arg(long = "consistency-at-least", value_name = "TOKEN")]
    pub(crate) at_least: Option<String>,

    /// Evaluate at exactly the snapshot named by this change token
    #[arg(long = "consistency-at-exactly", value_name = "TOKEN")]
    pub(crate) at_exactly: Option<String>,

    /// Evaluate at the lowest-latency revision (the default)
    #[arg(long = "consistency-min-latency")]
    pub(crate) min_latency: bool,
}

impl ConsistencyFlags {
    pub(crate) fn resolve(&self) -> zed_core::ZedResult<zed_proto::v1::Consistency> {
        zed_core::ConsistencyArgs {
            fully_consistent: self.full,
            at_least_as_fresh: self.at_least.clone(),
            at_exact_snapshot: self.at_exactly.clone(),
            minimize_latency: self.min_latency,
        }
        .resolve()
    }
}
