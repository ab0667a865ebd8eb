//! Software PWM "breathing" of the status LED through the SoC control
//! register.

use crate::device::DeviceRegisters;
use crate::protocol::registers::RegisterMap;

/// SoC control bit driving the on-board LED.
pub const SOC_CONTROL_LED: u32 = 1 << 0;

/// Fades the LED in and out by bit-banging the SoC control register.
#[derive(Debug, Clone, Copy)]
pub struct BreathingLed {
    /// Number of PWM slots per period; brightness ranges over `0..levels`.
    pub levels: u8,
    /// Periods emitted per brightness step.
    pub repeat: u32,
    /// Address of the SoC control register.
    pub soc_control: u64,
}

impl Default for BreathingLed {
    fn default() -> Self {
        Self {
            levels: 255,
            repeat: 4,
            soc_control: RegisterMap::DEVICE.soc_control,
        }
    }
}

impl BreathingLed {
    /// Emit `repeat` PWM periods with the LED on for `brightness` slots.
    pub fn pwm<R: DeviceRegisters>(&self, regs: &mut R, brightness: u8) -> Result<(), R::Error> {
        for _ in 0..self.repeat {
            for slot in 0..self.levels {
                let value = if slot < brightness { SOC_CONTROL_LED } else { 0 };
                regs.write_u32(self.soc_control, value)?;
            }
        }
        Ok(())
    }

    /// One full fade in followed by a fade out.
    pub fn cycle<R: DeviceRegisters>(&self, regs: &mut R) -> Result<(), R::Error> {
        for brightness in 0..self.levels {
            self.pwm(regs, brightness)?;
        }
        for brightness in (1..=self.levels).rev() {
            self.pwm(regs, brightness)?;
        }
        Ok(())
    }

    /// Breathe forever.
    pub fn run<R: DeviceRegisters>(&self, regs: &mut R) -> Result<std::convert::Infallible, R::Error> {
        loop {
            self.cycle(regs)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RegisterError;

    #[derive(Default)]
    struct Recorder {
        writes: Vec<(u64, u32)>,
    }

    impl DeviceRegisters for Recorder {
        type Error = RegisterError;

        fn read_u32(&mut self, _addr: u64) -> Result<u32, RegisterError> {
            Ok(0)
        }

        fn write_u32(&mut self, addr: u64, value: u32) -> Result<(), RegisterError> {
            self.writes.push((addr, value));
            Ok(())
        }
    }

    #[test]
    fn test_pwm_duty_cycle() {
        let led = BreathingLed {
            levels: 10,
            repeat: 2,
            ..Default::default()
        };
        let mut regs = Recorder::default();
        led.pwm(&mut regs, 3).unwrap();

        assert_eq!(regs.writes.len(), 20);
        let on = regs.writes.iter().filter(|(_, v)| *v == SOC_CONTROL_LED).count();
        assert_eq!(on, 6);
        assert!(regs
            .writes
            .iter()
            .all(|(a, _)| *a == RegisterMap::DEVICE.soc_control));
    }

    #[test]
    fn test_cycle_is_symmetric() {
        let led = BreathingLed {
            levels: 4,
            repeat: 1,
            ..Default::default()
        };
        let mut regs = Recorder::default();
        led.cycle(&mut regs).unwrap();

        // Fade in 0,1,2,3 then out 4,3,2,1: eight periods of four slots.
        assert_eq!(regs.writes.len(), 32);
        let on = regs.writes.iter().filter(|(_, v)| *v != 0).count();
        assert_eq!(on, 6 + 10);
    }
}
