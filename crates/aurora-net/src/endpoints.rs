//! URL construction for the two backend endpoints.
//!
//! Identities are appended as path segments, so they are percent-encoded
//! and cannot escape their segment.

use reqwest::Url;

use aurora_shared::Identity;

use crate::error::NetError;

/// Base URLs of the chat backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    api_base: Url,
    ws_base: Url,
}

impl Endpoints {
    /// `api_base` must be http(s), `ws_base` must be ws(s).
    pub fn new(api_base: &str, ws_base: &str) -> Result<Self, NetError> {
        let api_base = parse_base(api_base, &["http", "https"])?;
        let ws_base = parse_base(ws_base, &["ws", "wss"])?;
        Ok(Self { api_base, ws_base })
    }

    /// `{api_base}/api/chat/history/{me}/{peer}`
    pub fn history_url(&self, me: &Identity, peer: &Identity) -> Result<Url, NetError> {
        join_segments(
            &self.api_base,
            &["api", "chat", "history", me.as_str(), peer.as_str()],
        )
    }

    /// `{ws_base}/ws/{me}`
    pub fn live_url(&self, me: &Identity) -> Result<Url, NetError> {
        join_segments(&self.ws_base, &["ws", me.as_str()])
    }
}

fn parse_base(raw: &str, schemes: &[&str]) -> Result<Url, NetError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| NetError::InvalidEndpoint(format!("{raw}: {e}")))?;

    if !schemes.contains(&url.scheme()) {
        return Err(NetError::InvalidEndpoint(format!(
            "{raw}: expected scheme {}",
            schemes.join(" or ")
        )));
    }
    if url.cannot_be_a_base() {
        return Err(NetError::InvalidEndpoint(format!("{raw}: not a base URL")));
    }
    Ok(url)
}

fn join_segments(base: &Url, segments: &[&str]) -> Result<Url, NetError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| NetError::InvalidEndpoint(base.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
