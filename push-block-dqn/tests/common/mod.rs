use std::path::PathBuf;

use lazy_static::lazy_static;

pub const BATCH_SIZE: usize = 32;

#[rustfmt::skip]
lazy_static! {
    pub static ref CHECKPOINT_FILE_BASE: PathBuf = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("model/checkpoints/itest_push_block_75_64_64_5");
}

#[ctor::ctor]
fn init() {
    ql::util::log::init_logging();
}
