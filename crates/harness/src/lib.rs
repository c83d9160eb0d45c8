mod book;
mod presenter;

pub use book::TestBook;
pub use presenter::{PresenterEvent, RecordingPresenter};
