
use crate::core::notification::NotificationSubject;

/// Subject exposing only the mandatory identity.
pub(super) struct Bare;

impl NotificationSubject for Bare {
    fn object_type(&self) -> &'static str {
        "Request"
    }

    fn object_id(&self) -> &str {
        "7"
    }
}

/// Subject exposing every optional capability.
pub(super) struct Full;

impl NotificationSubject for Full {
    fn object_type(&self) -> &'static str {
        "Build"
    }

    fn object_id(&self) -> &str {
        "1"
    }

    fn request_id(&self) -> Option<&str> {
        Some("req-1")
    }

    fn repository_slug(&self) -> Option<String> {
        Some("acme/widgets".to_string())
    }

    fn queue(&self) -> Option<&str> {
        Some("builds.linux")
    }
}
