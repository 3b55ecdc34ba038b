mod dice;
mod wheel;

pub use dice::{DiceGame, DICE_GAME_ID};
pub use wheel::{Phase, WheelConfig, WheelGame, WHEEL_GAME_ID};
