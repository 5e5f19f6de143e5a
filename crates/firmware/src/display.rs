//! Shows the looper's state on the Nucleo board's three user LEDs.
//!
//! * Green (LD1) shows the selected slot: dark while idle, blinking while recording and lit while playing.
//! * Blue (LD2) flashes on activity, and stays lit for as long as a message is up.
//! * Red (LD3) blinks the number of the selected slot.
//!
//! Everything shown is logged too.

use defmt::*;
use embassy_stm32::gpio::Output;
use embassy_sync::{
    blocking_mutex::raw::CriticalSectionRawMutex,
    signal::Signal,
    watch::{Receiver, Sender, Watch},
};
use embassy_time::Timer;
use moopz_lib::{
    Duration,
    display::{Activity, Display, Notice, Status},
    looper::SlotStatus,
};

const STATUS_RECEIVER_CNT: usize = 2;
/// Syncs the looper's status to the LED tasks.
pub static STATUS_SYNC: Watch<CriticalSectionRawMutex, Status, STATUS_RECEIVER_CNT> = Watch::new();
pub type StatusSender<'a> = Sender<'a, CriticalSectionRawMutex, Status, STATUS_RECEIVER_CNT>;
pub type StatusReceiver<'a> = Receiver<'a, CriticalSectionRawMutex, Status, STATUS_RECEIVER_CNT>;

/// How long the blue LED should flash for, in milliseconds.
static FLASH: Signal<CriticalSectionRawMutex, u64> = Signal::new();

const ACTIVITY_FLASH_MS: u64 = 30;

/// The looper's [`Display`], handing what it is asked to show over to the LED tasks.
pub struct LedDisplay {
    status: StatusSender<'static>,
}

impl LedDisplay {
    pub fn new(status: StatusSender<'static>) -> Self {
        Self { status }
    }
}

impl Display for LedDisplay {
    fn show_status(&mut self, status: &Status) {
        info!("[{}] {}", status.mode.label(), status);
        self.status.send(*status);
    }

    fn show_transient_message(&mut self, notice: Notice, timeout: Duration) {
        info!("{}", Display2Format(&notice));
        FLASH.signal(timeout.as_millis());
    }

    fn blink(&mut self, activity: Activity) {
        trace!("{}", activity);
        FLASH.signal(ACTIVITY_FLASH_MS);
    }
}

/// Lights the blue LED whenever asked to flash.
#[embassy_executor::task]
pub async fn flash(mut led: Output<'static>) -> ! {
    loop {
        let millis = FLASH.wait().await;
        led.set_high();
        Timer::after_millis(millis).await;
        led.set_low();
    }
}

/// Shows the selected slot's status on the green LED.
#[embassy_executor::task]
pub async fn slot_status(mut led: Output<'static>, mut status: StatusReceiver<'static>) -> ! {
    const RECORDING_BLINK_MS: u64 = 250;

    loop {
        match status.get().await.slot_status {
            SlotStatus::Idle => led.set_low(),
            SlotStatus::Playing => led.set_high(),
            SlotStatus::Recording => led.toggle(),
        }
        Timer::after_millis(RECORDING_BLINK_MS).await;
    }
}

/// Provides a quick and dirty indicator of which slot is selected.
///
/// Each cycle is divided in half. The LED remains dark for one half. For the other, the LED lights up N times (where N is
/// one more than the index of the selected slot).
#[embassy_executor::task]
pub async fn selected_slot(mut led: Output<'static>, mut status: StatusReceiver<'static>) -> ! {
    const BLINK_SLEEP_US: u64 = 1_000_000;

    loop {
        led.set_low();
        Timer::after_micros(BLINK_SLEEP_US).await;

        let blink_cnt = (status.get().await.selected_slot as u64).saturating_add(1);
        // mult by two to account for the "off" periods, sub 1 so the LED always starts and ends lit
        let animation_frames = blink_cnt * 2 - 1;
        for _ in 0..animation_frames {
            led.toggle();
            Timer::after_micros(BLINK_SLEEP_US / animation_frames).await;
        }
    }
}
