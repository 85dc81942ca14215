//! Install/activate lifecycle: cache provisioning and stale-store cleanup.

use color_eyre::{eyre::eyre, Report, Result};
use futures::future::join_all;
use tracing::info;
use url::Url;

use crate::cache::{CacheRegistry, CacheStorage};
use crate::http::{Fetcher, Request};

/// Lifecycle states, in order. Active is terminal; a superseding version's
/// manager takes over from there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
  Parsed,
  Installing,
  Installed,
  Activating,
  Active,
}

/// Drives cache population on install and eviction of outdated stores on
/// activation.
pub struct LifecycleManager<S: CacheStorage, F: Fetcher> {
  registry: CacheRegistry<S>,
  fetcher: F,
  /// Essential resource paths precached at install time
  precache: Vec<String>,
  /// Application origin that the precache paths resolve against
  base: Url,
  state: LifecycleState,
}

impl<S: CacheStorage, F: Fetcher> LifecycleManager<S, F> {
  pub fn new(registry: CacheRegistry<S>, fetcher: F, precache: Vec<String>, base: Url) -> Self {
    Self {
      registry,
      fetcher,
      precache,
      base,
      state: LifecycleState::Parsed,
    }
  }

  pub fn state(&self) -> LifecycleState {
    self.state
  }

  /// Install: open both stores and eagerly write the static manifest into
  /// the static store. Any precache fetch failure fails the whole install.
  /// The waiting phase is skipped, so activation can follow immediately.
  pub async fn install(&mut self) -> Result<()> {
    self.state = LifecycleState::Installing;
    info!("Installing, precaching {} static files", self.precache.len());

    let names = self.registry.names().clone();
    self.registry.open(names.static_assets());
    self.registry.open(names.dynamic_data());

    let fetcher = &self.fetcher;
    let base = &self.base;
    let fetches = self.precache.iter().map(|path| {
      let request = Request::get(path).canonicalized(base);
      async move {
        let response = fetcher.fetch(&request).await?;
        Ok::<_, Report>((request, response))
      }
    });

    for result in join_all(fetches).await {
      let (request, response) = result?;
      if !response.is_success() {
        return Err(eyre!(
          "Precache fetch for {} returned status {}",
          request.url,
          response.status
        ));
      }
      self
        .registry
        .store(names.static_assets(), &request, &response);
    }

    self.state = LifecycleState::Installed;
    info!("Installed, skipping waiting phase");
    Ok(())
  }

  /// Activate: delete every store outside the current version's keep set,
  /// then claim all open clients without waiting for navigation.
  pub fn activate(&mut self) {
    self.state = LifecycleState::Activating;

    let names = self.registry.names().clone();
    self.registry.delete_stores_not_in(&names.keep_set());

    self.state = LifecycleState::Active;
    info!("Activated {}, claiming clients", names.umbrella());
  }
}
