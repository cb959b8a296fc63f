use gb_core::joypad::Button;
use gb_core::memory_bus::MemoryBus;
use sdl2::EventPump;
use sdl2::event::Event;
use sdl2::keyboard::Keycode;

/// Maps a host keycode onto the abstract Game Boy button it represents, if any.
fn map_key(key: Keycode) -> Option<Button> {
    match key {
        Keycode::Right | Keycode::D => Some(Button::Right),
        Keycode::Left | Keycode::A => Some(Button::Left),
        Keycode::Up | Keycode::W => Some(Button::Up),
        Keycode::Down | Keycode::S => Some(Button::Down),
        Keycode::Z | Keycode::J => Some(Button::A),
        Keycode::X | Keycode::K => Some(Button::B),
        Keycode::Backspace | Keycode::RShift => Some(Button::Select),
        Keycode::Return | Keycode::Space => Some(Button::Start),
        _ => None,
    }
}

/// Polls SDL events and updates the MemoryBus joypad state.
/// Returns `true` if the quit event was received, `false` otherwise.
pub fn handle_input(event_pump: &mut EventPump, memory_bus: &mut MemoryBus) -> bool {
    for event in event_pump.poll_iter() {
        match event {
            Event::Quit { .. }
            | Event::KeyDown {
                keycode: Some(Keycode::Escape),
                ..
            } => {
                println!("Exit requested.");
                return true; // Signal quit
            }
            Event::KeyDown {
                keycode: Some(key),
                repeat: false,
                ..
            } => {
                if let Some(button) = map_key(key) {
                    memory_bus.key_down(button);
                }
            }
            Event::KeyUp {
                keycode: Some(key),
                repeat: false,
                ..
            } => {
                if let Some(button) = map_key(key) {
                    memory_bus.key_up(button);
                }
            }
            _ => {} // Ignore other events
        }
    }
    false // Continue running
}
