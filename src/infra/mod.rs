pub mod fzf_picker;
pub mod gio_mount;
pub mod stdin_prompter;

pub use fzf_picker::FzfPicker;
pub use gio_mount::GioMountService;
pub use stdin_prompter::StdinPrompter;
