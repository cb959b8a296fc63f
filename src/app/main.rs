use std::{
    env,
    path::Path,
    thread,
    time::{Duration, Instant},
};

mod constants;
mod drawing;
mod emulator;
mod input;
mod sdl_setup;

use emulator::Emulator;

fn main() -> Result<(), String> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <rom_path>", args[0]);
        std::process::exit(1);
    }
    let rom_path = Path::new(&args[1]);
    let rom_filename = rom_path.file_name().unwrap_or_default().to_string_lossy();
    let window_title = format!("Rust GB Emu - {}", rom_filename);

    let mut sdl_context = sdl_setup::init_sdl(&window_title)?;

    let mut emulator = Emulator::new(rom_path, true)?;

    println!("Starting main loop...");
    'main_loop: loop {
        let frame_start_time = Instant::now();

        if input::handle_input(&mut sdl_context.event_pump, &mut emulator.memory_bus) {
            break 'main_loop;
        }

        if let Err(e) = emulator.run_frame() {
            eprintln!("Emulator error: {}", e);
            break 'main_loop;
        }

        sdl_context.canvas.set_draw_color(constants::BACKGROUND_COLOR);
        sdl_context.canvas.clear();

        if let Err(e) = drawing::draw_gb_screen(
            &mut sdl_context.canvas,
            &sdl_context.texture_creator,
            emulator.ppu.get_frame_buffer(),
        ) {
            eprintln!("Error drawing GB screen: {}", e);
        }

        sdl_context.canvas.present();

        let elapsed_time = frame_start_time.elapsed();
        if elapsed_time < constants::TARGET_FRAME_DURATION {
            let sleep_duration = constants::TARGET_FRAME_DURATION.saturating_sub(elapsed_time);
            if sleep_duration > Duration::from_millis(1) {
                thread::sleep(sleep_duration.saturating_sub(Duration::from_millis(1)));
            }
            while Instant::now() < frame_start_time + constants::TARGET_FRAME_DURATION {
                thread::yield_now();
            }
        }
    }

    println!("Emulator stopped.");
    Ok(())
}
