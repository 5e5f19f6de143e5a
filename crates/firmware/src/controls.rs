//! Tasks reading the pedal's buttons and knobs, and the channel through which they reach the looper.

use crate::lib_duration;
use embassy_stm32::{
    Peri,
    adc::Adc,
    exti::ExtiInput,
    gpio::Level,
    peripherals::{ADC1, PA3, PC0},
};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel};
use embassy_time::{Duration, Instant, Ticker, Timer};
use moopz_lib::controls::{ControlEvent, KnobDirection};

/// Control events, in the order they happened.
pub static CONTROL_EVENTS: Channel<CriticalSectionRawMutex, ControlEvent, 8> = Channel::new();

/// Contacts bounce for a few milliseconds after changing state.
const SETTLE: Duration = Duration::from_millis(20);
/// Readings closer than this to the previous one are noise.
const KNOB_DEAD_BAND: u16 = 4;
const KNOB_POLL: Duration = Duration::from_millis(100);

async fn wait_for(input: &mut ExtiInput<'static>, level: Level) {
    match level {
        Level::High => input.wait_for_high().await,
        Level::Low => input.wait_for_low().await,
    }
}

/// Reports presses and releases of button `id`, which reads `pressed` while held down.
#[embassy_executor::task(pool_size = 3)]
pub async fn button(mut input: ExtiInput<'static>, id: u8, pressed: Level) -> ! {
    let released = match pressed {
        Level::High => Level::Low,
        Level::Low => Level::High,
    };

    loop {
        wait_for(&mut input, pressed).await;
        Timer::after(SETTLE).await;
        if input.get_level() != pressed {
            continue;
        }

        let pressed_at = Instant::now();
        CONTROL_EVENTS.send(ControlEvent::press(id)).await;

        wait_for(&mut input, released).await;
        Timer::after(SETTLE).await;
        let held = lib_duration(pressed_at.elapsed());
        CONTROL_EVENTS.send(ControlEvent::release(id, held)).await;
    }
}

/// Polls both knobs, reporting them whenever they move.
#[embassy_executor::task]
pub async fn knobs(
    mut adc: Adc<'static, ADC1>,
    mut knob0: Peri<'static, PA3>,
    mut knob1: Peri<'static, PC0>,
) -> ! {
    let mut previous: [Option<u16>; 2] = [None; 2];
    let mut ticker = Ticker::every(KNOB_POLL);

    loop {
        ticker.next().await;
        // 12-bit readings, scaled to the 10 bits the looper expects
        let readings = [
            adc.blocking_read(&mut knob0) >> 2,
            adc.blocking_read(&mut knob1) >> 2,
        ];

        for (id, (&value, last)) in readings.iter().zip(previous.iter_mut()).enumerate() {
            if last.is_some_and(|last| last.abs_diff(value) < KNOB_DEAD_BAND) {
                continue;
            }
            let direction = last.map_or(KnobDirection::Unknown, |last| {
                KnobDirection::between(last, value)
            });
            *last = Some(value);

            let event = ControlEvent::Knob {
                id: id as u8,
                value,
                direction,
            };
            CONTROL_EVENTS.send(event).await;
        }
    }
}
