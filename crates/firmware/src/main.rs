//! MOOPZ is [Embassy](https://embassy.dev)-based firmware for a MIDI loop-recording pedal. The firmware runs on the
//! [Nucleo-F767ZI development board](https://www.st.com/en/evaluation-tools/nucleo-f767zi.html), which is powered by an
//! F7-series STM32 microcontroller.
//!
//! The pedal sits between a MIDI controller and whatever it drives. Everything played passes straight through; meanwhile
//! the pedal records the performance, and as soon as the performer starts repeating the phrase they began with, it loops
//! that phrase on its own. All of the looping logic lives in [`moopz_lib`]; this crate wires it to the hardware.
//!
//! For details about the hardware or how to use the device, see the `README`.

#![no_std]
#![no_main]

mod controls;
mod display;
mod io;

use crate::{display::LedDisplay, io::OutputBuffer};
use defmt::*;
use embassy_executor::Spawner;
use embassy_futures::select::{Either3, select3};
use embassy_stm32::{
    Config,
    adc::Adc,
    bind_interrupts,
    exti::ExtiInput,
    gpio::{Level, Output, Pull, Speed},
    mode::Async,
    peripherals,
    time::Hertz,
    usart::{self, RingBufferedUartRx, Uart, UartTx},
};
use embassy_time::{Duration, Ticker};
use moopz_lib::{configuration::LooperConfig, looper::Looper, midi::Decoder};
use static_cell::StaticCell;

use defmt_rtt as _;
#[cfg(not(feature = "debug"))]
use panic_halt as _;
#[cfg(feature = "debug")]
use panic_probe as _;

bind_interrupts!(
    #[doc(hidden)]
    struct Irqs {
        USART3 => usart::InterruptHandler<peripherals::USART3>;
    }
);

/// How often loops are serviced.
const TICK: Duration = Duration::from_millis(1);

/// The looper keeps its own notion of time; readings of the system clock are translated at the boundary.
pub(crate) fn now() -> moopz_lib::Instant {
    moopz_lib::Instant::from_micros(embassy_time::Instant::now().as_micros())
}

pub(crate) fn lib_duration(duration: Duration) -> moopz_lib::Duration {
    moopz_lib::Duration::from_micros(duration.as_micros())
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Initializing MOOPZ");

    let mut config = Config::default();
    {
        use embassy_stm32::rcc::*;
        // hse: high-speed external clock
        config.rcc.hse = Some(Hse {
            freq: Hertz(8_000_000),
            mode: HseMode::Bypass,
        });

        // pll: phase-locked loop, crucial for dividing clock
        config.rcc.pll_src = PllSource::HSE;
        config.rcc.pll = Some(Pll {
            prediv: PllPreDiv::DIV4,
            mul: PllMul::MUL216,
            divp: Some(PllPDiv::DIV2), // 8mhz / 4 * 216 / 2 = 216Mhz
            divq: None,
            divr: None,
        });
        config.rcc.ahb_pre = AHBPrescaler::DIV1;
        config.rcc.apb1_pre = APBPrescaler::DIV4;
        config.rcc.apb2_pre = APBPrescaler::DIV2;
        config.rcc.sys = Sysclk::PLL1_P;
    }
    let p = embassy_stm32::init(config);

    // USART3 is wired to the ST-LINK on the Nucleo; PD8 (TX) and PD9 (RX) are broken out on CN10 for the MIDI ports
    let mut uart_config = usart::Config::default();
    uart_config.baudrate = io::MIDI_BAUD_RATE;
    let uart = Uart::new(
        p.USART3,
        p.PD9,
        p.PD8,
        Irqs,
        p.DMA1_CH3,
        p.DMA1_CH1,
        uart_config,
    )
    .expect("MIDI baud rate should be reachable from the APB1 clock");
    let (midi_out, midi_in) = uart.split();
    static MIDI_IN_BUFFER: StaticCell<[u8; 128]> = StaticCell::new();
    let midi_in = midi_in.into_ring_buffered(MIDI_IN_BUFFER.init([0; 128]));

    let buttons = [
        (ExtiInput::new(p.PC13, p.EXTI13, Pull::None), Level::High),
        (ExtiInput::new(p.PD1, p.EXTI1, Pull::Up), Level::Low),
        (ExtiInput::new(p.PG2, p.EXTI2, Pull::Up), Level::Low),
    ];
    for (id, (input, pressed)) in buttons.into_iter().enumerate() {
        unwrap!(spawner.spawn(controls::button(input, id as u8, pressed)));
    }

    let adc = Adc::new(p.ADC1);
    unwrap!(spawner.spawn(controls::knobs(adc, p.PA3, p.PC0)));

    let green_led = Output::new(p.PB0, Level::Low, Speed::Low);
    let status = unwrap!(display::STATUS_SYNC.receiver());
    unwrap!(spawner.spawn(display::slot_status(green_led, status)));

    let red_led = Output::new(p.PB14, Level::Low, Speed::Low);
    let status = unwrap!(display::STATUS_SYNC.receiver());
    unwrap!(spawner.spawn(display::selected_slot(red_led, status)));

    let blue_led = Output::new(p.PB7, Level::Low, Speed::Low);
    unwrap!(spawner.spawn(display::flash(blue_led)));

    let display = LedDisplay::new(display::STATUS_SYNC.sender());
    unwrap!(spawner.spawn(looper_task(midi_in, midi_out, display)));
}

/// Task owning the looper: feeds it MIDI, control events and the passage of time, and sends out whatever it produces.
#[embassy_executor::task]
async fn looper_task(
    mut midi_in: RingBufferedUartRx<'static>,
    mut midi_out: UartTx<'static, Async>,
    display: LedDisplay,
) -> ! {
    let config = LooperConfig::default();
    info!("Starting looper with {}", config);
    let mut looper: Looper<LedDisplay> = Looper::new(config, display);
    let mut decoder = Decoder::new();
    let mut output = OutputBuffer::default();
    let mut ticker = Ticker::every(TICK);
    let mut buf = [0; 32];

    loop {
        match select3(
            midi_in.read(&mut buf),
            ticker.next(),
            controls::CONTROL_EVENTS.receive(),
        )
        .await
        {
            Either3::First(Ok(n)) => {
                let timestamp = now();
                for &byte in &buf[..n] {
                    decoder.feed(byte, timestamp, &mut looper, &mut output);
                }
            }
            Either3::First(Err(e)) => {
                warn!("MIDI input error: {}", Debug2Format(&e));
            }
            Either3::Second(()) => looper.tick(now(), &mut output),
            Either3::Third(event) => looper.on_control(event, now(), &mut output),
        }
        output.flush(&mut midi_out).await;
    }
}
