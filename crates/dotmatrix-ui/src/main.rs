mod audio;

use clap::Parser;
use dotmatrix_core::{
    cartridge::Cartridge,
    gameboy::GameBoy,
    ppu::{SCREEN_HEIGHT, SCREEN_WIDTH},
};
use log::info;
use pixels::{Pixels, SurfaceTexture};
use std::time::{Duration, Instant};
use winit::{
    event::{ElementState, Event, VirtualKeyCode, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    window::WindowBuilder,
};

const SCALE: u32 = 3;

/// Host frame budget (~59.73 Hz).
const FRAME_TIME: Duration = Duration::from_micros(16_742);

#[derive(Parser)]
struct Args {
    /// Path to ROM file
    rom: std::path::PathBuf,

    /// Run without opening a window
    #[arg(long)]
    headless: bool,

    /// Number of frames to run in headless mode
    #[arg(long)]
    frames: Option<usize>,

    /// Number of seconds to run in headless mode
    #[arg(long)]
    seconds: Option<u64>,

    /// Number of CPU cycles to run in headless mode
    #[arg(long)]
    cycles: Option<u64>,

    /// Periodically print CPU state
    #[arg(long)]
    debug: bool,
}

/// Map a key to its bit in the packed button state:
/// bit 0 Right, 1 Left, 2 Up, 3 Down, 4 A, 5 B, 6 Select, 7 Start.
fn button_mask(key: VirtualKeyCode) -> Option<u8> {
    match key {
        VirtualKeyCode::Right => Some(0x01),
        VirtualKeyCode::Left => Some(0x02),
        VirtualKeyCode::Up => Some(0x04),
        VirtualKeyCode::Down => Some(0x08),
        VirtualKeyCode::X => Some(0x10),
        VirtualKeyCode::Z => Some(0x20),
        VirtualKeyCode::LShift | VirtualKeyCode::RShift => Some(0x40),
        VirtualKeyCode::Return => Some(0x80),
        _ => None,
    }
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let cart = match Cartridge::from_file(&args.rom) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load ROM: {e}");
            std::process::exit(1);
        }
    };

    let mut gb = GameBoy::new();
    gb.load_cart(cart);

    let mut frame = vec![0u32; SCREEN_WIDTH * SCREEN_HEIGHT];
    let mut frame_count = 0u64;

    if args.headless {
        run_headless(&mut gb, &args, &mut frame);
        return;
    }

    // Audio failure is not fatal; the emulator just runs silently.
    let audio_stream = gb
        .mmu
        .apu
        .take_consumer()
        .and_then(audio::start_stream);
    if let Some((_, rate)) = &audio_stream {
        gb.mmu.apu.set_sample_rate(*rate);
        info!("audio stream started at {rate} Hz");
    }

    let event_loop = EventLoop::new();
    let window = WindowBuilder::new()
        .with_title("dotmatrix")
        .with_inner_size(winit::dpi::LogicalSize::new(
            (SCREEN_WIDTH as u32 * SCALE) as f64,
            (SCREEN_HEIGHT as u32 * SCALE) as f64,
        ))
        .build(&event_loop)
        .expect("Failed to create window");

    let size = window.inner_size();
    let surface = SurfaceTexture::new(size.width, size.height, &window);
    let mut pixels = Pixels::new(SCREEN_WIDTH as u32, SCREEN_HEIGHT as u32, surface)
        .expect("Failed to create render surface");

    // Packed button state, active low.
    let mut state = 0xFFu8;
    let mut last_frame = Instant::now();

    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Poll;
        match event {
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::CloseRequested => *control_flow = ControlFlow::Exit,
                WindowEvent::Resized(size) => {
                    let _ = pixels.resize_surface(size.width, size.height);
                }
                WindowEvent::KeyboardInput { input, .. } => {
                    if let Some(key) = input.virtual_keycode {
                        let pressed = input.state == ElementState::Pressed;
                        if key == VirtualKeyCode::Escape {
                            if pressed {
                                *control_flow = ControlFlow::Exit;
                            }
                        } else if let Some(mask) = button_mask(key) {
                            if pressed {
                                state &= !mask;
                            } else {
                                state |= mask;
                            }
                            gb.mmu.input.update_state(state, &mut gb.mmu.if_reg);
                        }
                    }
                }
                _ => {}
            },
            Event::MainEventsCleared => {
                gb.run_frame();
                frame.copy_from_slice(gb.mmu.ppu.framebuffer());
                gb.mmu.ppu.clear_frame_flag();
                window.request_redraw();

                if args.debug && frame_count % 60 == 0 {
                    println!("{}", gb.cpu.debug_state());
                }
                frame_count += 1;

                // Sleep off the remainder of the frame budget. Sleep jitter
                // is not corrected.
                let elapsed = last_frame.elapsed();
                if elapsed < FRAME_TIME {
                    std::thread::sleep(FRAME_TIME - elapsed);
                }
                last_frame = Instant::now();
            }
            Event::RedrawRequested(_) => {
                pixels
                    .frame_mut()
                    .copy_from_slice(bytemuck::cast_slice(&frame));
                if pixels.render().is_err() {
                    *control_flow = ControlFlow::Exit;
                }
            }
            _ => {}
        }
    });
}

fn run_headless(gb: &mut GameBoy, args: &Args, frame: &mut [u32]) {
    let second_limit = args.seconds.map(Duration::from_secs);
    let start = Instant::now();
    let mut frame_count = 0u64;

    loop {
        gb.run_frame();
        frame.copy_from_slice(gb.mmu.ppu.framebuffer());
        gb.mmu.ppu.clear_frame_flag();

        if args.debug && frame_count % 60 == 0 {
            println!("{}", gb.cpu.debug_state());
        }
        frame_count += 1;

        if let Some(max) = args.frames {
            if frame_count >= max as u64 {
                break;
            }
        }
        if let Some(max) = args.cycles {
            if gb.cpu.cycles >= max {
                break;
            }
        }
        if let Some(limit) = second_limit {
            if start.elapsed() >= limit {
                break;
            }
        }
    }
}
