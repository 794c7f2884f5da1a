//! Forwards alarms to the motion webhook.
//!
//! `Start` and `Pulse` post to `/motion?{camera}`, `Stop` posts to
//! `/motion/reset?{camera}`. Failures are logged and otherwise ignored so a
//! slow or absent webhook never backs up the event streams.

use std::time::Duration;

use nvrlink_config::{Camera, Defaults};
use nvrlink_core::{AlarmAction, AlarmEvent};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::CliError;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);

pub struct MotionRelay {
    http: reqwest::Client,
    base: Url,
    cameras: Vec<Camera>,
}

impl MotionRelay {
    /// Relay to `http://{motion_host}:{motion_port}/`.
    pub fn new(defaults: &Defaults, cameras: Vec<Camera>) -> Result<Self, CliError> {
        let raw = format!("http://{}:{}/", defaults.motion_host, defaults.motion_port);
        let base = Url::parse(&raw).map_err(|e| CliError::Validation {
            field: "defaults.motion_host".into(),
            reason: format!("{raw}: {e}"),
        })?;
        Self::with_base(base, cameras)
    }

    pub fn with_base(base: Url, cameras: Vec<Camera>) -> Result<Self, CliError> {
        let http = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .user_agent(concat!("nvrlink/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base,
            cameras,
        })
    }

    /// Webhook URL for `action` on `camera`; `None` for actions with no mapping.
    pub fn endpoint(&self, action: &AlarmAction, camera: &str) -> Option<Url> {
        let path = match action {
            AlarmAction::Start | AlarmAction::Pulse => "motion",
            AlarmAction::Stop => "motion/reset",
            AlarmAction::Unknown(_) => return None,
        };
        let mut url = self.base.join(path).ok()?;
        url.set_query(Some(camera));
        Some(url)
    }

    /// Post `alarm` for every matching camera. Returns how many posts succeeded.
    pub async fn relay(&self, alarm: &AlarmEvent) -> usize {
        let mut delivered = 0;
        let mut matched = false;

        for camera in self
            .cameras
            .iter()
            .filter(|c| c.matches(&alarm.host, alarm.index, &alarm.event_type))
        {
            matched = true;
            let Some(url) = self.endpoint(&alarm.action, &camera.name) else {
                debug!(camera = %camera.name, action = %alarm.action, "no webhook for action");
                continue;
            };

            match self.http.post(url.clone()).send().await {
                Ok(resp) if resp.status().is_success() => {
                    info!(camera = %camera.name, action = %alarm.action, "motion webhook sent");
                    delivered += 1;
                }
                Ok(resp) => {
                    warn!(camera = %camera.name, url = %url, status = %resp.status(), "motion webhook rejected");
                }
                Err(e) => {
                    warn!(camera = %camera.name, url = %url, error = %e, "motion webhook failed");
                }
            }
        }

        if !matched {
            debug!(alarm = %alarm, "no camera configured for alarm");
        }
        delivered
    }
}
