//! 트랜잭션 수집.
//!
//! 프로바이더 푸시(웹훅 배치, 로그 알림) → 파싱 → 서명 중복 제거 → 룸 라우팅 및 랭킹 집계.

mod dedup;
mod fetcher;
mod parser;
mod payload;
mod pipeline;
mod programs;

pub use dedup::SignatureDedup;
pub use fetcher::{RpcTransactionFetcher, TransactionFetcher};
pub use parser::TransactionParser;
pub use payload::{
    AccountKey, LogsNotification, MatchedInstruction, MatchedTransaction, TokenBalance, UiTokenAmount,
    WebhookBatch,
};
pub use pipeline::{ingest_channel, BatchReport, IngestHandle, IngestJob, IngestPipeline};
pub use programs::ProgramTable;
