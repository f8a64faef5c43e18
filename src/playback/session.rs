use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::catalog::model::SourceDescriptor;
use crate::config::PlaybackSettings;
use crate::foundation::core::Frame;
use crate::foundation::error::{SkyloopError, SkyloopResult};
use crate::playback::controller::{PlaybackController, PlaybackEvent, PlaybackMode};
use crate::preload::preloader::{FramePreloader, PreloadReport};

/// Playback of one source after its health probe and preload.
pub struct PlaybackSession {
    /// Verified frames in display order; `Shown { index }` refers to this list.
    pub frames: Vec<Frame>,
    /// Outcome of the frame preload.
    pub report: PreloadReport,
    /// Controller already animating, or showing the latest image only.
    pub controller: PlaybackController,
    /// Events published by `controller`.
    pub events: UnboundedReceiver<PlaybackEvent>,
}

impl PlaybackSession {
    /// Return `true` when too few frames verified and only the latest image is shown.
    pub fn is_degraded(&self) -> bool {
        self.controller.mode() == PlaybackMode::LatestOnly
    }
}

/// Probe `source`, verify `frames`, and start playback over the survivors.
///
/// The probe decodes the source's latest image, or its newest listed frame when the source has
/// none. A failed probe returns the error before any controller exists. Fewer verified frames
/// than the preloader's `min_frames` start the controller in latest-only mode.
pub async fn start_playback(
    source: &SourceDescriptor,
    frames: Vec<Frame>,
    preloader: &FramePreloader,
    settings: &PlaybackSettings,
    cancel: &CancellationToken,
) -> SkyloopResult<PlaybackSession> {
    let probe_target = source
        .latest_url
        .as_deref()
        .or_else(|| frames.last().map(|f| f.url.as_str()));
    let Some(url) = probe_target else {
        return Err(SkyloopError::validation(format!(
            "source '{}' has no image to probe",
            source.key
        )));
    };
    preloader.probe_url(&source.key, url).await?;

    let urls: Vec<String> = frames.iter().map(|f| f.url.clone()).collect();
    let report = preloader.preload(&urls, cancel).await;
    if report.cancelled {
        return Err(SkyloopError::Cancelled);
    }
    let playable: Vec<Frame> = frames
        .into_iter()
        .filter(|f| report.verified.contains(&f.url))
        .collect();

    let (mut controller, events) = PlaybackController::new(playable.len().max(1), settings);
    if report.should_degrade(preloader.options().min_frames) {
        warn!(
            source = %source.key,
            verified = playable.len(),
            "too few frames for animation; showing the latest image only"
        );
        controller.enter_latest_only();
    } else {
        controller.play()?;
        info!(source = %source.key, frames = playable.len(), "animation started");
    }

    Ok(PlaybackSession {
        frames: playable,
        report,
        controller,
        events,
    })
}

#[cfg(test)]
#[path = "../../tests/unit/playback/session.rs"]
mod tests;
