use notify_rust::Notification;
use tracing::warn;

use crate::panel::{Notice, NoticeLevel};

/// Mirrors a warning or error notice as a desktop notification.
pub fn desktop(notice: &Notice) {
    if notice.level == NoticeLevel::Info {
        return;
    }
    if let Err(e) = Notification::new()
        .summary("ValRender")
        .body(&notice.message)
        .show()
    {
        warn!("desktop notification failed: {}", e);
    }
}
