//! Demo cycle handlers: the controller sends a ramping setpoint, the device
//! echoes the last one it received.

use rtcycle_cyclic::{Cycle, CyclicHandler, RxMessage, TimerHealth};
use tracing::{debug, trace};

const MSG_SETPOINT: u16 = 1;
const MSG_FEEDBACK: u16 = 2;

fn read_u32(payload: &[u8]) -> Option<u32> {
    payload.first_chunk::<4>().map(|b| u32::from_le_bytes(*b))
}

/// Sends an incrementing setpoint every period.
#[derive(Debug, Default)]
pub struct Controller {
    setpoint: u32,
    feedback: Option<u32>,
}

impl CyclicHandler for Controller {
    fn on_receive(&mut self, msg: &RxMessage<'_>) {
        if msg.msg_id == MSG_FEEDBACK {
            self.feedback = read_u32(msg.payload);
        }
    }

    fn on_cycle(&mut self, cycle: &mut Cycle<'_>) {
        if cycle.health() == TimerHealth::Fault {
            debug!(task = cycle.task_id(), "controller cycle skipped on timer fault");
            return;
        }
        self.setpoint = self.setpoint.wrapping_add(1);
        if let Err(err) = cycle.transmit(MSG_SETPOINT, &self.setpoint.to_le_bytes()) {
            trace!(task = cycle.task_id(), %err, "setpoint not sent");
        }
        trace!(setpoint = self.setpoint, feedback = ?self.feedback, "controller cycle");
    }
}

/// Answers each period with the last setpoint seen.
#[derive(Debug, Default)]
pub struct IoDevice {
    last: u32,
}

impl CyclicHandler for IoDevice {
    fn on_receive(&mut self, msg: &RxMessage<'_>) {
        if msg.msg_id == MSG_SETPOINT
            && let Some(value) = read_u32(msg.payload)
        {
            self.last = value;
        }
    }

    fn on_cycle(&mut self, cycle: &mut Cycle<'_>) {
        if cycle.health() == TimerHealth::Fault {
            return;
        }
        if let Err(err) = cycle.transmit(MSG_FEEDBACK, &self.last.to_le_bytes()) {
            trace!(task = cycle.task_id(), %err, "feedback not sent");
        }
    }
}
