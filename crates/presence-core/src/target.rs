//! Resolution of the user-supplied subscription target

use crate::config::{AccountConfig, OutboundProxy};
use crate::engine::{Engine, SipUri};
use crate::error::PresenceResult;

/// Turn the optional target given by the user into a full SIP URI.
///
/// - nothing given: the account's resource list `sip:<user>-buddies@<domain>`
/// - no `@`: the account domain is appended
/// - no `sip:`/`sips:` scheme: `sip:` is prepended
///
/// The result is parsed by the engine; a malformed URI is reported as
/// [`PresenceError::MalformedUri`](crate::error::PresenceError::MalformedUri).
pub fn resolve_target(
    engine: &dyn Engine,
    account: &AccountConfig,
    target: Option<&str>,
) -> PresenceResult<SipUri> {
    let Some(target) = target else {
        return Ok(SipUri::new(
            Some(format!("{}-buddies", account.username())),
            account.domain(),
        ));
    };

    let mut text = target.trim().to_string();
    if !text.contains('@') {
        text = format!("{}@{}", text, account.domain());
    }
    if !text.starts_with("sip:") && !text.starts_with("sips:") {
        text = format!("sip:{}", text);
    }
    engine.parse_sip_uri(&text)
}

/// URI handed to the resolver when an outbound proxy overrides the target
pub fn proxy_uri(proxy: &OutboundProxy) -> SipUri {
    SipUri::new(None, proxy.host.clone())
        .with_port(proxy.port)
        .with_parameter("transport", Some(proxy.transport.to_string()))
}

/// Address of record of the account as a SIP URI
pub fn account_uri(account: &AccountConfig) -> SipUri {
    SipUri::new(Some(account.username().to_string()), account.domain())
}
