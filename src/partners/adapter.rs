//! Partner adapter contracts.
//!
//! One [`PartnerAdapter`] bridges the engine to one ad network SDK. All calls
//! are callback based: completions may arrive on any thread, and the engine
//! re-dispatches them onto its background context before touching shared state.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::handle::PartnerAdEvents;
use crate::ads::{BannerSize, PartnerAdLoadRequest, PreBidRequest, Viewport};
use crate::error::{ErrorCode, MediationError, PartnerError};

/// Partner identifier, e.g. `"alpha_network"`.
pub type PartnerId = Arc<str>;

/// One-shot callback handed to partner code.
pub type Completion<T> = Box<dyn FnOnce(T) + Send + 'static>;

/// Bidder tokens keyed by partner.
pub type BidderTokens = HashMap<PartnerId, HashMap<String, String>>;

/// Static description of an adapter and the SDK it wraps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartnerInfo {
    pub partner_id: PartnerId,
    pub display_name: String,
    pub partner_sdk_version: String,
    pub adapter_version: String,
}

/// Everything an adapter needs to set up its SDK.
#[derive(Debug, Clone, Default)]
pub struct PartnerConfiguration {
    pub credentials: HashMap<String, String>,
    /// Consents known when setup started.
    pub consents: HashMap<String, String>,
    pub is_user_underage: bool,
}

/// Bridge to one ad network.
pub trait PartnerAdapter: Send + Sync + 'static {
    fn info(&self) -> PartnerInfo;

    /// Sets up the partner SDK.
    fn set_up(&self, configuration: PartnerConfiguration, completion: Completion<Result<(), PartnerError>>);

    /// Fetches the token sent with the auction request.
    fn fetch_bidder_information(
        &self,
        request: &PreBidRequest,
        completion: Completion<Result<HashMap<String, String>, PartnerError>>,
    );

    /// Applies consent changes. `modified` lists keys changed, added or removed.
    fn set_consents(&self, consents: &HashMap<String, String>, modified: &HashSet<String>);

    fn set_is_user_underage(&self, is_user_underage: bool);

    /// Creates the partner ad object for one bid. Banner ads are created on the main context.
    fn make_ad(
        &self,
        request: PartnerAdLoadRequest,
        events: PartnerAdEvents,
    ) -> Result<Arc<dyn PartnerAd>, PartnerError>;

    fn map_set_up_error(&self, _error: &PartnerError) -> Option<ErrorCode> {
        None
    }

    fn map_prebid_error(&self, _error: &PartnerError) -> Option<ErrorCode> {
        None
    }

    fn map_load_error(&self, _error: &PartnerError) -> Option<ErrorCode> {
        None
    }

    fn map_show_error(&self, _error: &PartnerError) -> Option<ErrorCode> {
        None
    }

    fn map_invalidate_error(&self, _error: &PartnerError) -> Option<ErrorCode> {
        None
    }
}

/// A partner's creative for one bid.
///
/// The engine only tracks the handle's presence in storage; it never looks
/// inside the partner object.
pub trait PartnerAd: Send + Sync + 'static {
    fn request(&self) -> &PartnerAdLoadRequest;

    fn load(&self, viewport: Option<Viewport>, completion: Completion<Result<(), PartnerError>>);

    /// Presents a full-screen ad. Banners are laid out by the caller instead.
    fn show(&self, _viewport: Viewport, completion: Completion<Result<(), PartnerError>>) {
        completion(Err(MediationError::new(ErrorCode::ShowFailureWrongResourceType).into()));
    }

    /// Releases partner resources.
    fn invalidate(&self) -> Result<(), PartnerError> {
        Ok(())
    }

    /// Banner ads: whether a view is available to lay out.
    fn has_banner_view(&self) -> bool {
        false
    }

    /// Banner ads: delivered size, when the partner knows it.
    fn banner_size(&self) -> Option<BannerSize> {
        None
    }
}
