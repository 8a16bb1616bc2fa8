pub mod dialogue_controller;
pub mod speech_controller;
pub mod system_controller;
