//! コマンド間で共有するモジュール

pub mod config;
pub mod io;
