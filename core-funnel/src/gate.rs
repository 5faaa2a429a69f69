//! # Visitor Gate
//!
//! Decides who sees the landing form, the releases hub and the download page.
//! Per-song markers (`gate_<slug>`, `gate_email_<slug>`) take precedence over
//! the site-wide ones.

use std::sync::Arc;

use core_playback::GLOBAL_SUPPORTER_MARKER;
use core_runtime::events::GrantScope;
use core_runtime::logging::redact_email;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::activity_feed::safe_decode;
use crate::catalog::Catalog;
use crate::contributions::ContributionRepository;
use crate::error::{FunnelError, Result};
use crate::subscribers::{EmailRepository, GATE_EMAIL_MARKER, GATE_MARKER};
use crate::visitor::{Destination, Visitor};

/// Any of these being set marks a returning visitor.
pub const KNOWN_VISITOR_MARKERS: [&str; 4] =
    [GLOBAL_SUPPORTER_MARKER, "email", "has_email", "caliph_email"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseAccess {
    /// Full tracks and downloads.
    Supporter,
    /// Passed the email gate; previews only.
    Gated,
    RedirectToGate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadAccess {
    Allowed,
    RedirectToBuy(Destination),
}

pub struct VisitorGate {
    catalog: Arc<Catalog>,
    emails: Arc<dyn EmailRepository>,
    contributions: Arc<dyn ContributionRepository>,
}

impl VisitorGate {
    pub fn new(
        catalog: Arc<Catalog>,
        emails: Arc<dyn EmailRepository>,
        contributions: Arc<dyn ContributionRepository>,
    ) -> Self {
        Self {
            catalog,
            emails,
            contributions,
        }
    }

    pub async fn is_known_visitor(&self, visitor: &Visitor) -> bool {
        for name in KNOWN_VISITOR_MARKERS {
            if visitor.is_present(name).await {
                return true;
            }
        }
        false
    }

    /// Redirect for the landing page, if any.
    pub async fn landing(&self, visitor: &Visitor) -> Option<Destination> {
        self.is_known_visitor(visitor)
            .await
            .then_some(Destination::Home)
    }

    /// Access to the releases hub, optionally for one song.
    pub async fn release_access(&self, slug: Option<&str>, visitor: &Visitor) -> Result<ReleaseAccess> {
        let slug = self.known_slug(slug)?;

        if visitor.is_supporter(slug.as_deref()).await {
            return Ok(ReleaseAccess::Supporter);
        }

        let Some(email) = self.gate_email(slug.as_deref(), visitor).await else {
            debug!(?slug, "Visitor has not passed the gate");
            return Ok(ReleaseAccess::RedirectToGate);
        };

        match self.emails.find(&email).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                debug!(email = %redact_email(&email), "Gate email is not subscribed");
                return Ok(ReleaseAccess::RedirectToGate);
            }
            Err(e) => {
                warn!(error = %e, "Subscriber lookup failed");
                return Ok(ReleaseAccess::RedirectToGate);
            }
        }

        match self.contributions.exists_for_email(&email).await {
            Ok(true) => {
                visitor.grant(&GrantScope::Global).await?;
                info!(email = %redact_email(&email), "Supporter access restored from contribution");
                Ok(ReleaseAccess::Supporter)
            }
            Ok(false) => Ok(ReleaseAccess::Gated),
            Err(e) => {
                warn!(error = %e, "Contribution lookup failed");
                Ok(ReleaseAccess::Gated)
            }
        }
    }

    pub async fn download_access(&self, slug: Option<&str>, visitor: &Visitor) -> Result<DownloadAccess> {
        let slug = self.known_slug(slug)?;

        if visitor.is_supporter(slug.as_deref()).await {
            return Ok(DownloadAccess::Allowed);
        }

        let destination = match slug {
            Some(slug) => Destination::BuySong(slug),
            None => Destination::Buy,
        };
        Ok(DownloadAccess::RedirectToBuy(destination))
    }

    fn known_slug(&self, slug: Option<&str>) -> Result<Option<String>> {
        slug.map(|raw| {
            self.catalog
                .get(raw)
                .map(|song| song.slug.clone())
                .ok_or_else(|| FunnelError::UnknownSong(raw.to_string()))
        })
        .transpose()
    }

    /// Decoded, lowercased gate email if the visitor opened the gate.
    async fn gate_email(&self, slug: Option<&str>, visitor: &Visitor) -> Option<String> {
        let mut opened = visitor.flag(GATE_MARKER).await;
        let mut raw = None;

        if let Some(slug) = slug {
            opened = opened || visitor.flag(&format!("{GATE_MARKER}_{slug}")).await;
            raw = visitor.value(&format!("{GATE_EMAIL_MARKER}_{slug}")).await;
        }
        if raw.is_none() {
            raw = visitor.value(GATE_EMAIL_MARKER).await;
        }

        if !opened {
            return None;
        }
        let email = safe_decode(raw.as_deref())?.trim().to_lowercase();
        (!email.is_empty()).then_some(email)
    }
}
