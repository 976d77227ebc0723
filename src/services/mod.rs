pub mod detector;
pub mod evidence;
pub mod orchestrator;
pub mod splitter;
pub mod validator;
