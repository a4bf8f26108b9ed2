use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use pixels::{Error, Pixels, SurfaceTexture};
use subtick::{Player, PipelineMetricsSnapshot, Vec2};
use tracing::warn;
use winit::window::Window;

use super::toy_host::{self, ToyLevel, COURSE_LENGTH};

pub(crate) const PIXELS_PER_UNIT: f32 = 32.0;
const PLAYER_HALF_SIZE_PX: i32 = 14;
const CAMERA_LEAD_UNITS: f32 = 6.0;

const CLEAR_COLOR: [u8; 4] = [18, 20, 28, 255];
const GROUND_COLOR: [u8; 4] = [90, 96, 120, 255];
const PLATFORM_COLOR: [u8; 4] = [140, 120, 200, 255];
const PLAYER_COLORS: [[u8; 4]; 2] = [[90, 220, 120, 255], [90, 170, 240, 255]];
const LANDED_COLOR: [u8; 4] = [250, 250, 250, 255];
const DISABLED_TINT: [u8; 4] = [200, 90, 90, 255];

static VIEW_LOCK_POISON_WARNED: AtomicBool = AtomicBool::new(false);

fn warn_view_lock_poison_once(operation: &'static str) {
    if VIEW_LOCK_POISON_WARNED
        .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
        .is_ok()
    {
        warn!(operation, "view lock poisoned; recovered inner value");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub(crate) struct PlayerView {
    pub(crate) position: Vec2,
    pub(crate) rotation_deg: f32,
    pub(crate) landed: bool,
}

/// What the simulation thread hands the render thread after each batch of
/// ticks.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub(crate) struct FrameView {
    pub(crate) players: [PlayerView; 2],
    pub(crate) dual: bool,
    pub(crate) enabled: bool,
    pub(crate) label: Option<&'static str>,
    pub(crate) attempts: u32,
    pub(crate) presses: u32,
    pub(crate) metrics: PipelineMetricsSnapshot,
}

impl FrameView {
    pub(crate) fn capture(
        level: &ToyLevel,
        dual: bool,
        enabled: bool,
        label: Option<&'static str>,
        metrics: PipelineMetricsSnapshot,
    ) -> Self {
        let view_of = |player: Player| {
            let state = level.player(player);
            PlayerView {
                position: state.position,
                rotation_deg: state.rotation_deg,
                landed: state.landed_on().is_some(),
            }
        };
        Self {
            players: [view_of(Player::One), view_of(Player::Two)],
            dual,
            enabled,
            label,
            attempts: level.attempts(),
            presses: level.presses(),
            metrics,
        }
    }

    pub(crate) fn title(&self, base: &str) -> String {
        let mode = if self.enabled { "sub-tick" } else { "native" };
        let label = self.label.map(|label| format!(" [{label}]")).unwrap_or_default();
        format!(
            "{base}{label} | {mode} | attempt {} | presses {} | {:.0} tps, {:.1} steps/tick",
            self.attempts, self.presses, self.metrics.tps, self.metrics.avg_steps_per_tick
        )
    }
}

#[derive(Clone, Debug, Default)]
pub(crate) struct SharedView {
    view: Arc<RwLock<FrameView>>,
}

impl SharedView {
    pub(crate) fn snapshot(&self) -> FrameView {
        match self.view.read() {
            Ok(guard) => *guard,
            Err(poisoned) => {
                warn_view_lock_poison_once("read");
                *poisoned.into_inner()
            }
        }
    }

    pub(crate) fn publish(&self, view: FrameView) {
        match self.view.write() {
            Ok(mut guard) => *guard = view,
            Err(poisoned) => {
                warn_view_lock_poison_once("write");
                *poisoned.into_inner() = view;
            }
        }
    }
}

pub(crate) struct Renderer {
    window: Arc<Window>,
    pixels: Pixels<'static>,
    width: u32,
    height: u32,
}

impl Renderer {
    pub(crate) fn new(window: Arc<Window>) -> Result<Self, Error> {
        let size = window.inner_size();
        let pixels = Self::build_pixels(Arc::clone(&window), size.width, size.height)?;
        Ok(Self {
            window,
            pixels,
            width: size.width,
            height: size.height,
        })
    }

    pub(crate) fn resize(&mut self, width: u32, height: u32) -> Result<(), Error> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.pixels = Self::build_pixels(Arc::clone(&self.window), width, height)?;
        self.width = width;
        self.height = height;
        Ok(())
    }

    fn build_pixels(
        window: Arc<Window>,
        width: u32,
        height: u32,
    ) -> Result<Pixels<'static>, Error> {
        let surface = SurfaceTexture::new(width, height, window);
        Pixels::new(width, height, surface)
    }

    pub(crate) fn render(&mut self, view: &FrameView) -> Result<(), Error> {
        let (width, height) = (self.width, self.height);
        let frame = self.pixels.frame_mut();
        for pixel in frame.chunks_exact_mut(4) {
            pixel.copy_from_slice(&CLEAR_COLOR);
        }

        let camera = Camera::following(view.players[0].position.x, height);
        draw_course(frame, width, height, &camera);

        let active = if view.dual { 2 } else { 1 };
        for (index, player) in view.players.iter().take(active).enumerate() {
            let (cx, cy) = camera.to_screen(player.position);
            let color = if !view.enabled {
                DISABLED_TINT
            } else if player.landed {
                LANDED_COLOR
            } else {
                PLAYER_COLORS[index]
            };
            draw_square(
                frame,
                width,
                height,
                cx,
                cy - PLAYER_HALF_SIZE_PX,
                PLAYER_HALF_SIZE_PX,
                color,
            );
            draw_rotation_marker(frame, width, cx, cy - PLAYER_HALF_SIZE_PX, player.rotation_deg);
        }

        self.pixels.render()
    }
}

#[derive(Debug, Clone, Copy)]
struct Camera {
    left_units: f32,
    ground_px: i32,
}

impl Camera {
    fn following(target_x: f32, height: u32) -> Self {
        Self {
            left_units: target_x - CAMERA_LEAD_UNITS,
            ground_px: (height as f32 * 0.75) as i32,
        }
    }

    fn to_screen(&self, world: Vec2) -> (i32, i32) {
        let x = ((world.x - self.left_units) * PIXELS_PER_UNIT).round() as i32;
        let y = self.ground_px - (world.y * PIXELS_PER_UNIT).round() as i32;
        (x, y)
    }

    fn visible_units(&self, width: u32) -> (f32, f32) {
        (self.left_units, self.left_units + width as f32 / PIXELS_PER_UNIT)
    }
}

fn draw_course(frame: &mut [u8], width: u32, height: u32, camera: &Camera) {
    let (left, right) = camera.visible_units(width);
    let first_lap = (left / COURSE_LENGTH).floor() as i32;
    let last_lap = (right / COURSE_LENGTH).floor() as i32;

    for column in 0..width as i32 {
        let world_x = left + column as f32 / PIXELS_PER_UNIT;
        let course_x = world_x.rem_euclid(COURSE_LENGTH);
        let in_pit = toy_host::pits()
            .iter()
            .any(|&(start, end)| course_x >= start && course_x < end);
        if in_pit {
            continue;
        }
        for y in camera.ground_px..height as i32 {
            write_pixel_rgba_clipped(frame, width as usize, column, y, GROUND_COLOR);
        }
    }

    for lap in first_lap..=last_lap {
        let lap_offset = lap as f32 * COURSE_LENGTH;
        for &(start, end, top) in toy_host::platforms() {
            let (x0, y) = camera.to_screen(Vec2 {
                x: lap_offset + start,
                y: top,
            });
            let (x1, _) = camera.to_screen(Vec2 {
                x: lap_offset + end,
                y: top,
            });
            for x in x0..x1 {
                for thickness in 0..4 {
                    write_pixel_rgba_clipped(frame, width as usize, x, y + thickness, PLATFORM_COLOR);
                }
            }
        }
    }
}

fn draw_rotation_marker(frame: &mut [u8], width: u32, cx: i32, cy: i32, rotation_deg: f32) {
    let radians = rotation_deg.to_radians();
    let reach = PLAYER_HALF_SIZE_PX as f32 - 2.0;
    for step in 0..=reach as i32 {
        let distance = step as f32;
        let x = cx + (radians.cos() * distance).round() as i32;
        let y = cy - (radians.sin() * distance).round() as i32;
        write_pixel_rgba_clipped(frame, width as usize, x, y, CLEAR_COLOR);
    }
}

fn write_pixel_rgba_clipped(frame: &mut [u8], width: usize, x: i32, y: i32, color: [u8; 4]) {
    if x < 0 || y < 0 || x as usize >= width {
        return;
    }
    let Some(pixel_offset) = (y as usize)
        .checked_mul(width)
        .and_then(|row| row.checked_add(x as usize))
    else {
        return;
    };
    let Some(byte_offset) = pixel_offset.checked_mul(4) else {
        return;
    };
    let Some(end) = byte_offset.checked_add(4) else {
        return;
    };
    if end > frame.len() {
        return;
    }
    frame[byte_offset..end].copy_from_slice(&color);
}

fn draw_square(
    frame: &mut [u8],
    width: u32,
    height: u32,
    cx: i32,
    cy: i32,
    half_size: i32,
    color: [u8; 4],
) {
    for y in (cy - half_size)..=(cy + half_size) {
        for x in (cx - half_size)..=(cx + half_size) {
            if x < 0 || y < 0 || x >= width as i32 || y >= height as i32 {
                continue;
            }
            write_pixel_rgba_clipped(frame, width as usize, x, y, color);
        }
    }
}
