/*!
 # Controller discovery

 Enumerates advertising peers through the transport's discovery primitive
 and yields unconnected [`LedSession`] handles. Results follow discovery
 arrival order; repeated sightings of the same address keep the first
 occurrence. Discovery holds no state beyond one call.
*/

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{debug, info, instrument};

use crate::session::LedSession;
use crate::transport::{Advertisement, Transport};
use crate::{Error, Result};

/// Immutable identity of a discovered controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// Advertised local name, if broadcast
    pub name: Option<String>,
    /// Transport-level address
    pub address: String,
}

impl std::fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({})",
            self.name.as_deref().unwrap_or("Unknown Triones"),
            self.address
        )
    }
}

/// How discovered peers are matched against a requested name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameFilter {
    /// Keep every peer, named or not
    Any,
    /// Keep peers whose advertised name equals the given string
    Exact(String),
    /// Keep peers whose advertised name starts with the given string
    Prefix(String),
}

impl NameFilter {
    /// Exact-match filter.
    pub fn exact(name: impl Into<String>) -> NameFilter {
        NameFilter::Exact(name.into())
    }

    /// Prefix-match filter.
    pub fn prefix(prefix: impl Into<String>) -> NameFilter {
        NameFilter::Prefix(prefix.into())
    }

    fn matches(&self, name: Option<&str>) -> bool {
        match self {
            NameFilter::Any => true,
            NameFilter::Exact(want) => name == Some(want.as_str()),
            NameFilter::Prefix(want) => name.is_some_and(|n| n.starts_with(want.as_str())),
        }
    }
}

/// Discovers controllers and produces unconnected sessions.
pub struct Scanner<T: Transport> {
    transport: Arc<T>,
}

impl<T: Transport> Scanner<T> {
    /// Creates a scanner over the given transport.
    pub fn new(transport: Arc<T>) -> Scanner<T> {
        Scanner { transport }
    }

    /// Collects every peer matching `filter` seen within `timeout`.
    ///
    /// Results are in first-seen order with repeated addresses collapsed to
    /// their first occurrence. An empty result is a success; use the
    /// `find_*` variants when absence should be an error.
    #[instrument(skip(self))]
    pub async fn discover(
        &self,
        timeout: Duration,
        filter: NameFilter,
    ) -> Result<Vec<LedSession<T>>> {
        info!("Scanning for controllers (timeout: {timeout:?})");
        let mut events = self.transport.scan(timeout).await?;
        let deadline = Instant::now() + timeout;

        let mut seen = HashSet::new();
        let mut sessions = Vec::new();
        loop {
            let adv = match time::timeout_at(deadline, events.recv()).await {
                // Discovery window elapsed, or the transport stopped
                Err(_) | Ok(None) => break,
                Ok(Some(adv)) => adv,
            };
            if !filter.matches(adv.name.as_deref()) {
                continue;
            }
            if !seen.insert(adv.address.clone()) {
                continue;
            }

            let identity = DeviceIdentity {
                name: adv.name,
                address: adv.address,
            };
            debug!("Found controller: {identity}");
            sessions.push(LedSession::new(self.transport.clone(), identity));
        }

        info!("Found {} controller(s)", sessions.len());
        Ok(sessions)
    }

    /// Finds the first peer whose advertised name equals `name`.
    ///
    /// Returns as soon as a match arrives; fails with [`Error::NotFound`]
    /// if none does before `timeout`.
    #[instrument(skip(self))]
    pub async fn find_by_name(&self, name: &str, timeout: Duration) -> Result<LedSession<T>> {
        let filter = NameFilter::exact(name);
        self.find_first(timeout, |adv| filter.matches(adv.name.as_deref()))
            .await
    }

    /// Finds the first peer with the given address (case-insensitive).
    ///
    /// Returns as soon as a match arrives; fails with [`Error::NotFound`]
    /// if none does before `timeout`.
    #[instrument(skip(self))]
    pub async fn find_by_address(&self, address: &str, timeout: Duration) -> Result<LedSession<T>> {
        self.find_first(timeout, |adv| adv.address.eq_ignore_ascii_case(address))
            .await
    }

    async fn find_first<F>(&self, timeout: Duration, matches: F) -> Result<LedSession<T>>
    where
        F: Fn(&Advertisement) -> bool,
    {
        let mut events = self.transport.scan(timeout).await?;
        let deadline = Instant::now() + timeout;

        loop {
            match time::timeout_at(deadline, events.recv()).await {
                Err(_) | Ok(None) => return Err(Error::NotFound(timeout)),
                Ok(Some(adv)) if matches(&adv) => {
                    let identity = DeviceIdentity {
                        name: adv.name,
                        address: adv.address,
                    };
                    debug!("Found controller: {identity}");
                    return Ok(LedSession::new(self.transport.clone(), identity));
                }
                Ok(Some(_)) => continue,
            }
        }
    }
}
