//! ベンチマーク結果の集計・クロス検証ツール
//!
//! 結果ファイルの探索と読み込み、設定ファイル、プロット用 CSV の出力など、
//! `src/bin/` の各コマンドが共有する処理をまとめる。

pub mod common;
pub mod plot;
