//! MIDI in and out through the pedal's DIN ports, which hang off USART3.

use defmt::*;
use embassy_stm32::{mode::Async, usart::UartTx};
use moopz_lib::midi::MidiOut;
use tinyvec::ArrayVec;

/// MIDI 1.0 runs at 31.25kbaud.
pub const MIDI_BAUD_RATE: u32 = 31_250;

const OUTPUT_CAPACITY: usize = 256;

/// Collects whatever the looper writes during one step, so that it can be sent in a single transfer.
///
/// Messages which would not fit are dropped whole; a truncated message would desynchronize the receiver.
#[derive(Default)]
pub struct OutputBuffer {
    bytes: ArrayVec<[u8; OUTPUT_CAPACITY]>,
    dropped: usize,
}

impl MidiOut for OutputBuffer {
    fn write(&mut self, bytes: &[u8]) {
        if self.bytes.len() + bytes.len() > OUTPUT_CAPACITY {
            self.dropped += 1;
            return;
        }
        self.bytes.extend_from_slice(bytes);
    }
}

impl OutputBuffer {
    /// Send everything collected so far.
    pub async fn flush(&mut self, tx: &mut UartTx<'static, Async>) {
        if self.dropped > 0 {
            warn!("Output buffer full, dropped {} messages", self.dropped);
            self.dropped = 0;
        }
        if self.bytes.is_empty() {
            return;
        }
        if let Err(e) = tx.write(&self.bytes).await {
            error!("Could not send MIDI: {}", Debug2Format(&e));
        }
        self.bytes.clear();
    }
}
