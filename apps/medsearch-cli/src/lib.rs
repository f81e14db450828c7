//! Helpers behind the `medsearch` binary: argument parsing and rendering.

pub mod args;
pub mod output;

/// Queries run by `medsearch selftest`.
pub const SELF_TEST_QUERIES: [&str; 4] = ["头痛 发热", "头痛 发热 咳嗽", "胸痛 呼吸困难", "腹痛 呕吐"];
