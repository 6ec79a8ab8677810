//! 알려진 DEX 프로그램 테이블.

use std::collections::HashMap;

/// 기본 등록 프로그램 (program id, 플랫폼 이름).
const KNOWN_PROGRAMS: &[(&str, &str)] = &[
    ("JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4", "jupiter"),
    ("675kPX9MHTjS2zt1qfr1NYHuzeLXfQM9H24wFSUt1Mp8", "raydium"),
    ("CAMMCzo5YL8w4VFF8KVHrK22GGUsp5VTaW7grrKgrWqK", "raydium"),
    ("CPMMoo8L3F4NbTegBCKVNunggL7H1ZpdTHKxQB5qKP1C", "raydium"),
    ("whirLbMiicVdio4qvUfM5KAg6Ct8VwpYzGff3uctyCc", "orca"),
    ("6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P", "pumpfun"),
    ("pAMMBay6oceH9fJKBRHGP5D4bD4sWpmSwMn52FMfXEA", "pumpswap"),
    ("LBUZKhRxPF3XUpBCjp4YzTKgLccjZhTSDM9YuVaPwxo", "meteora"),
    ("Eo7WjKq67rjJQSZxS6z3YkapzY3eMj6Xy8X5EQVn5UaB", "meteora"),
    ("PhoeNiXZ8ByJGLkxNfZRnkUfjvmuYqLR89jjFHGqdXY", "phoenix"),
];

/// 프로그램 ID → 플랫폼 이름.
#[derive(Debug, Clone)]
pub struct ProgramTable {
    programs: HashMap<String, String>,
}

impl Default for ProgramTable {
    fn default() -> Self {
        Self {
            programs: KNOWN_PROGRAMS
                .iter()
                .map(|(id, name)| (id.to_string(), name.to_string()))
                .collect(),
        }
    }
}

impl ProgramTable {
    pub fn lookup(&self, program_id: &str) -> Option<&str> {
        self.programs.get(program_id).map(String::as_str)
    }

    /// `Program <id> invoke [n]` 형식 로그에서 프로그램 ID를 추출합니다.
    pub fn program_from_log(line: &str) -> Option<&str> {
        let mut parts = line.split_whitespace();
        if parts.next()? != "Program" {
            return None;
        }
        let program_id = parts.next()?;
        (parts.next()? == "invoke").then_some(program_id)
    }
}
