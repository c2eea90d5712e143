use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use log::debug;
use rand::Rng;

use crate::{
    error::SessionError,
    helpers::lock,
    store::{Filter, SessionStore, Table},
};

pub const CODE_MIN: u32 = 100_000;
pub const CODE_MAX: u32 = 999_999;

/// Session codes are exactly six ASCII digits.
pub fn is_valid_code(code: &str) -> bool {
    code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit())
}

pub trait CodeSource: Send + Sync {
    fn next_code(&self) -> String;
}

/// Uniform over `[100000, 999999]`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomCodes;

impl CodeSource for RandomCodes {
    fn next_code(&self) -> String {
        rand::thread_rng().gen_range(CODE_MIN..=CODE_MAX).to_string()
    }
}

/// Hands out a fixed list of codes, repeating the last one once the list runs out.
#[derive(Debug)]
pub struct FixedCodes {
    codes: Mutex<VecDeque<String>>,
    last: Mutex<String>,
}

impl FixedCodes {
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let codes: VecDeque<String> = codes.into_iter().map(Into::into).collect();
        let last = codes.back().cloned().unwrap_or_else(|| CODE_MIN.to_string());
        FixedCodes {
            codes: Mutex::new(codes),
            last: Mutex::new(last),
        }
    }
}

impl CodeSource for FixedCodes {
    fn next_code(&self) -> String {
        match lock(&self.codes).pop_front() {
            Some(code) => code,
            None => lock(&self.last).clone(),
        }
    }
}

pub struct SessionCodeGenerator {
    store: Arc<dyn SessionStore>,
    source: Arc<dyn CodeSource>,
    max_attempts: usize,
}

impl SessionCodeGenerator {
    pub fn new(store: Arc<dyn SessionStore>, source: Arc<dyn CodeSource>, max_attempts: usize) -> Self {
        SessionCodeGenerator {
            store,
            source,
            max_attempts: max_attempts.max(1),
        }
    }

    /// A code no active session is using. Ended sessions give their codes back.
    pub async fn generate(&self) -> Result<String, SessionError> {
        for attempt in 1..=self.max_attempts {
            let code = self.source.next_code();
            let holders = self
                .store
                .select_many(
                    Table::Sessions,
                    &Filter::new().eq("session_code", code.as_str()).eq("is_active", true),
                    None,
                )
                .await?;

            if holders.is_empty() {
                return Ok(code);
            }
            debug!("Session code {} taken (attempt {})", code, attempt);
        }

        Err(SessionError::CodeGenerationExhausted {
            attempts: self.max_attempts,
        })
    }
}
