pub mod dialogue;
pub mod llm;
pub mod merge;
pub mod playback;
pub mod prompt;
pub mod recovery;
pub mod speech;
pub mod storyboard;
