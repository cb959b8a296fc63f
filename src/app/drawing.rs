use super::constants::{GB_HEIGHT, GB_SCREEN_HEIGHT, GB_SCREEN_WIDTH, GB_WIDTH, PALETTE};
use sdl2::rect::Rect;
use sdl2::render::{Canvas, TextureCreator};
use sdl2::video::{Window, WindowContext};

/// Draws the Game Boy frame buffer (one color index 0..3 per pixel) scaled
/// up to fill the window.
pub fn draw_gb_screen(
    canvas: &mut Canvas<Window>,
    texture_creator: &TextureCreator<WindowContext>,
    frame_buffer: &[u8; GB_WIDTH * GB_HEIGHT],
) -> Result<(), String> {
    let mut texture = texture_creator
        .create_texture_streaming(sdl2::pixels::PixelFormatEnum::RGB24, GB_WIDTH as u32, GB_HEIGHT as u32)
        .map_err(|e| e.to_string())?;

    texture.with_lock(None, |pixel_buffer: &mut [u8], pitch: usize| {
        for y in 0..GB_HEIGHT {
            for x in 0..GB_WIDTH {
                let color_index = frame_buffer[y * GB_WIDTH + x] as usize & 0b11;
                let color = PALETTE[color_index];
                let offset = y * pitch + x * 3;
                pixel_buffer[offset] = color.r;
                pixel_buffer[offset + 1] = color.g;
                pixel_buffer[offset + 2] = color.b;
            }
        }
    })
    .map_err(|e| e.to_string())?;

    canvas.copy(&texture, None, Some(Rect::new(0, 0, GB_SCREEN_WIDTH, GB_SCREEN_HEIGHT)))
}
