//! Viewport - the camera mapping image pixels onto the container.
//!
//! `view = image * scale + translation`. The translation is the view-space
//! offset of the image origin and is always kept inside the boundary policy
//! of [`Viewport::clamp_translation`].

use serde::{Deserialize, Serialize};

use crate::coords::{ImageSize, Size, Vec2};

/// Two touches closer than this are too noisy to derive a zoom ratio from
const MIN_PINCH_DISTANCE: f64 = 1.0;

/// Tunables for zoom behaviour
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    pub min_scale: f64,
    pub max_scale: f64,
    /// Multiplicative zoom factor applied per discrete wheel event
    pub wheel_step: f64,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            min_scale: 0.05,
            max_scale: 8.0,
            wheel_step: 1.1,
        }
    }
}

/// Monotonically increasing token used to request a viewport reset.
///
/// Whoever owns the "reset zoom" action bumps the token; the viewport resets
/// once for every token it has not observed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct ResetToken(pub u64);

impl ResetToken {
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

/// View camera over a single image
#[derive(Debug, Clone, PartialEq)]
pub struct Viewport {
    scale: f64,
    translation: Vec2,
    container: Size,
    image: ImageSize,
    config: ViewportConfig,
    seen_reset: ResetToken,
}

impl Viewport {
    /// Create a viewport showing `image` at scale 1, centered where it fits
    pub fn new(container: Size, image: ImageSize, config: ViewportConfig) -> Self {
        let mut viewport = Self {
            scale: 1.0,
            translation: Vec2::ZERO,
            container,
            image,
            config,
            seen_reset: ResetToken::default(),
        };
        viewport.reset();
        viewport
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn translation(&self) -> Vec2 {
        self.translation
    }

    pub fn container_size(&self) -> Size {
        self.container
    }

    pub fn image_size(&self) -> ImageSize {
        self.image
    }

    pub fn config(&self) -> &ViewportConfig {
        &self.config
    }

    /// Convert a view-space position to image space
    pub fn screen_to_image(&self, screen: Vec2) -> Vec2 {
        (screen - self.translation) / self.scale
    }

    /// Convert an image-space position to view space
    pub fn image_to_screen(&self, image: Vec2) -> Vec2 {
        image * self.scale + self.translation
    }

    /// Clamp a candidate scale into the configured bounds. Unlike `f64::clamp`
    /// this tolerates an inverted or NaN range.
    pub fn clamp_scale(&self, scale: f64) -> f64 {
        if !scale.is_finite() || scale <= 0.0 {
            return self.config.min_scale;
        }
        scale.max(self.config.min_scale).min(self.config.max_scale)
    }

    /// Boundary policy for a candidate translation at a given scale.
    ///
    /// Per axis: an image narrower than the container is centered (and cannot
    /// be dragged on that axis); a wider image is kept covering the container,
    /// so an edge of the image never leaves the frame by more than the overhang.
    ///
    /// This is narrower than merely keeping some edge of the image inside the
    /// container: an oversized image can never expose background.
    pub fn clamp_translation(&self, candidate: Vec2, scale: f64) -> Vec2 {
        Vec2::new(
            clamp_axis(candidate.x, self.container.width, self.image.width() * scale),
            clamp_axis(candidate.y, self.container.height, self.image.height() * scale),
        )
    }

    /// Zoom to `target_scale`, keeping the image point under `pivot` fixed on screen
    pub fn apply_zoom(&mut self, pivot: Vec2, target_scale: f64) {
        let anchor = self.screen_to_image(pivot);
        let scale = self.clamp_scale(target_scale);
        self.set_transform(scale, pivot - anchor * scale);
    }

    /// Handle one discrete wheel or trackpad scroll event.
    ///
    /// Only the sign of `delta_y` matters: negative zooms in, positive zooms out.
    pub fn wheel(&mut self, pivot: Vec2, delta_y: f64) {
        let step = self.config.wheel_step;
        let target = if delta_y < 0.0 {
            self.scale * step
        } else if delta_y > 0.0 {
            self.scale / step
        } else {
            return;
        };
        self.apply_zoom(pivot, target);
    }

    /// Drag the view by a view-space delta
    pub fn pan_by(&mut self, delta: Vec2) {
        self.set_transform(self.scale, self.translation + delta);
    }

    /// Recenter at scale 1 for the current container
    pub fn reset(&mut self) {
        let scale = self.clamp_scale(1.0);
        let centered = Vec2::new(
            (self.container.width - self.image.width() * scale) / 2.0,
            (self.container.height - self.image.height() * scale) / 2.0,
        );
        self.set_transform(scale, centered);
        tracing::debug!(scale, "viewport reset");
    }

    /// Reset once for each newly observed trigger token. Returns true if a reset ran.
    pub fn observe_reset(&mut self, token: ResetToken) -> bool {
        if token <= self.seen_reset {
            return false;
        }
        self.seen_reset = token;
        self.reset();
        true
    }

    /// Largest in-bounds scale that shows the whole image, centered
    pub fn fit_to_container(&mut self) {
        if self.image.is_empty() {
            self.reset();
            return;
        }
        let fit = (self.container.width / self.image.width())
            .min(self.container.height / self.image.height());
        let scale = self.clamp_scale(fit);
        self.set_transform(scale, self.translation);
    }

    /// Container changed size (window resize, orientation change)
    pub fn resize(&mut self, container: Size) {
        self.container = container;
        self.set_transform(self.scale, self.translation);
    }

    /// Switch to a different image, resetting the camera
    pub fn set_image_size(&mut self, image: ImageSize) {
        self.image = image;
        self.reset();
    }

    fn set_transform(&mut self, scale: f64, translation: Vec2) {
        self.scale = scale;
        self.translation = self.clamp_translation(translation, scale);
    }
}

fn clamp_axis(t: f64, container: f64, extent: f64) -> f64 {
    if extent <= container {
        (container - extent) / 2.0
    } else {
        t.clamp(container - extent, 0.0)
    }
}

/// Joint zoom + pan driven by two simultaneous touches.
///
/// Each update compares against the previous touch geometry: the distance
/// ratio drives the zoom and the midpoint motion drives the pan, both
/// folded into a single transform update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PinchTracker {
    last_distance: f64,
    last_midpoint: Vec2,
}

impl PinchTracker {
    pub fn begin(a: Vec2, b: Vec2) -> Self {
        Self {
            last_distance: a.distance(b),
            last_midpoint: a.midpoint(b),
        }
    }

    pub fn update(&mut self, viewport: &mut Viewport, a: Vec2, b: Vec2) {
        let distance = a.distance(b);
        let midpoint = a.midpoint(b);

        let anchor = viewport.screen_to_image(self.last_midpoint);
        let scale = if self.last_distance < MIN_PINCH_DISTANCE || distance < MIN_PINCH_DISTANCE {
            viewport.scale
        } else {
            viewport.clamp_scale(viewport.scale * distance / self.last_distance)
        };
        viewport.set_transform(scale, midpoint - anchor * scale);

        self.last_distance = distance;
        self.last_midpoint = midpoint;
    }
}
