//! Motorized stages. Positions and speeds are in device units; axes count from 0.

use crate::error::Result;

pub trait MotorStage {
    fn get_position(&self, axis: usize) -> Result<f64>;
    fn move_to(&self, position: f64, axis: usize) -> Result<()>;
    fn move_by(&self, distance: f64, axis: usize) -> Result<()> {
        let position = self.get_position(axis)?;
        self.move_to(position + distance, axis)
    }
    fn set_speed(&self, speed: f64, axis: usize) -> Result<()>;
    /// Stops any movement of `axis` immediately.
    fn stop(&self, axis: usize) -> Result<()>;
    fn home(&self, axis: usize) -> Result<()>;
}
