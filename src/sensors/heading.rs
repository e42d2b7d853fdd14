use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::sensors::WatchId;

/// One orientation event from the device
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OrientationReading {
    /// Calibrated compass heading (0° = north, clockwise), when the platform has one
    pub compass_heading: Option<f64>,
    /// Raw rotation angle around the vertical axis
    pub alpha: Option<f64>,
}

impl OrientationReading {
    /// Heading in [0, 360), preferring the calibrated compass value
    pub fn heading(&self) -> Option<f64> {
        self.compass_heading
            .or(self.alpha)
            .filter(|h| h.is_finite())
            .map(|h| h.rem_euclid(360.0))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Unknown,
    Granted,
    Denied,
}

/// Platform orientation sensors
#[async_trait]
pub trait OrientationService: Send {
    /// Whether [`OrientationService::request_permission`] must succeed before subscribing
    fn requires_permission(&self) -> bool {
        false
    }

    async fn request_permission(&mut self) -> bool {
        true
    }

    fn subscribe(&mut self, sink: UnboundedSender<OrientationReading>) -> WatchId;

    fn unsubscribe(&mut self, id: WatchId);
}

/// Latest compass heading, gated by the platform permission
pub struct HeadingSource<S: OrientationService> {
    service: S,
    permission: Permission,
    heading: Option<f64>,
    subscription: Option<WatchId>,
}

impl<S: OrientationService> HeadingSource<S> {
    pub fn new(service: S) -> Self {
        let permission = if service.requires_permission() {
            Permission::Unknown
        } else {
            Permission::Granted
        };
        HeadingSource {
            service,
            permission,
            heading: None,
            subscription: None,
        }
    }

    /// Ask the platform for sensor access; implicitly granted where none is needed
    pub async fn request_permission(&mut self) -> bool {
        if self.permission == Permission::Granted {
            return true;
        }
        let granted = self.service.request_permission().await;
        self.permission = if granted {
            Permission::Granted
        } else {
            log::info!("Orientation permission denied, heading unavailable");
            Permission::Denied
        };
        granted
    }

    pub fn permission(&self) -> Permission {
        self.permission
    }

    /// Subscribe to orientation events; None without permission
    pub fn start(&mut self) -> Option<UnboundedReceiver<OrientationReading>> {
        if self.permission != Permission::Granted {
            log::debug!("Not subscribing to orientation: permission {:?}", self.permission);
            return None;
        }
        self.stop();
        let (tx, rx) = unbounded_channel();
        self.subscription = Some(self.service.subscribe(tx));
        Some(rx)
    }

    /// Returns the new heading, if the reading carried one
    pub fn accept(&mut self, reading: OrientationReading) -> Option<f64> {
        let heading = reading.heading()?;
        self.heading = Some(heading);
        Some(heading)
    }

    pub fn heading(&self) -> Option<f64> {
        self.heading
    }

    pub fn stop(&mut self) {
        if let Some(id) = self.subscription.take() {
            self.service.unsubscribe(id);
        }
    }
}

impl<S: OrientationService> Drop for HeadingSource<S> {
    fn drop(&mut self) {
        self.stop();
    }
}
