//! User-agent redirect boundary.

// self
use crate::_prelude::*;

/// Sends the user agent to a URL (a full-page redirect in a browser host).
pub trait Navigator
where
	Self: Send + Sync,
{
	/// Navigates to `url`.
	fn navigate(&self, url: &Url) -> Result<()>;
}

/// Navigator that records every visit instead of leaving the page.
///
/// Used as the default for headless hosts and in tests.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
	visits: Mutex<Vec<Url>>,
}
impl RecordingNavigator {
	/// Every URL navigated to, oldest first.
	pub fn visits(&self) -> Vec<Url> {
		self.visits.lock().clone()
	}

	/// Most recent navigation target.
	pub fn last(&self) -> Option<Url> {
		self.visits.lock().last().cloned()
	}
}
impl Navigator for RecordingNavigator {
	fn navigate(&self, url: &Url) -> Result<()> {
		log_debug!(origin = %url.origin().ascii_serialization(), "Recording navigation.");

		self.visits.lock().push(url.clone());

		Ok(())
	}
}
