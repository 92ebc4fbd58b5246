//! Shared DNS resolver construction.

use std::net::SocketAddr;
use std::sync::LazyLock;

use hickory_resolver::{
    TokioResolver,
    config::{NameServerConfigGroup, ResolverConfig, ResolverOpts},
    name_server::TokioConnectionProvider,
};

use crate::config::DnsConfig;
use crate::error::EngineResult;

/// Human-readable description of the DNS servers used by the system resolver.
pub(crate) static SYSTEM_DNS_LABEL: LazyLock<String> = LazyLock::new(|| {
    #[cfg(any(unix, target_os = "windows"))]
    {
        if let Ok((config, _opts)) = hickory_resolver::system_conf::read_system_conf() {
            let ips = dedup_ips(&config);
            if !ips.is_empty() {
                return ips.join(", ");
            }
        }
    }

    let fallback = ResolverConfig::default();
    let ips = dedup_ips(&fallback);
    if ips.is_empty() {
        "Default".to_string()
    } else {
        ips.join(", ")
    }
});

/// Deduplicate nameserver IP addresses from a resolver configuration.
pub(crate) fn dedup_ips(config: &ResolverConfig) -> Vec<String> {
    let mut ips: Vec<String> = Vec::new();
    for ns in config.name_servers() {
        let ip = ns.socket_addr.ip().to_string();
        if !ips.contains(&ip) {
            ips.push(ip);
        }
    }
    ips
}

/// Label of the nameservers a resolver built from `config` talks to.
pub(crate) fn nameserver_label(config: &DnsConfig) -> String {
    if config.nameservers.is_empty() {
        SYSTEM_DNS_LABEL.clone()
    } else {
        config.nameservers.join(", ")
    }
}

fn apply_options(opts: &mut ResolverOpts, config: &DnsConfig) {
    opts.timeout = config.lookup_timeout();
    opts.attempts = config.attempts;
}

/// Build the resolver shared by every lookup of an engine instance.
///
/// Uses the configured nameservers when there are any, the host system
/// configuration otherwise.
pub(crate) fn build_resolver(config: &DnsConfig) -> EngineResult<TokioResolver> {
    let addrs = config.nameserver_addrs()?;
    if !addrs.is_empty() {
        return Ok(build_resolver_for_addrs(&addrs, config));
    }
    Ok(build_system_resolver(config))
}

fn build_resolver_for_addrs(addrs: &[SocketAddr], config: &DnsConfig) -> TokioResolver {
    let mut group = NameServerConfigGroup::new();
    for addr in addrs {
        group.merge(NameServerConfigGroup::from_ips_clear(
            &[addr.ip()],
            addr.port(),
            true,
        ));
    }
    let resolver_config = ResolverConfig::from_parts(None, vec![], group);
    let provider = TokioConnectionProvider::default();
    let mut opts = ResolverOpts::default();
    apply_options(&mut opts, config);
    TokioResolver::builder_with_config(resolver_config, provider)
        .with_options(opts)
        .build()
}

/// Build a resolver using the host system DNS configuration (with fallback).
fn build_system_resolver(config: &DnsConfig) -> TokioResolver {
    #[cfg(any(unix, target_os = "windows"))]
    {
        match TokioResolver::builder_tokio() {
            Ok(mut builder) => {
                apply_options(builder.options_mut(), config);
                return builder.build();
            }
            Err(e) => {
                log::warn!(
                    "Failed to load system DNS configuration, falling back to defaults: {e}"
                );
            }
        }
    }

    let provider = TokioConnectionProvider::default();
    let mut opts = ResolverOpts::default();
    apply_options(&mut opts, config);
    TokioResolver::builder_with_config(ResolverConfig::default(), provider)
        .with_options(opts)
        .build()
}
