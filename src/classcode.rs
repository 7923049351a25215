//! Fourteen digit class codes.
//!
//! A class code is a 4 character 1g code followed by five 2 character
//! increment blocks. Block `"00"` means no increment, otherwise the
//! first digit selects the factor and the second the direction.

use crate::error::{Error, Result};

pub const CLASS_CODE_LENGTH: usize = 14;
pub const NUM_INCREMENTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Increment {
    /// Position of the block, starting at 1.
    pub number: i64,
    pub factor: String,
    pub direction: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassCode {
    pub code: String,
    pub oneg: String,
    pub increments: Vec<Increment>,
}

impl ClassCode {
    pub fn parse(code: &str) -> Result<ClassCode> {
        if code.len() != CLASS_CODE_LENGTH || !code.is_ascii() {
            return Err(Error::InvalidClassCode(code.to_string()));
        }

        let increments = (0..NUM_INCREMENTS)
            .filter_map(|i| {
                let block = &code[4 + 2 * i..6 + 2 * i];
                if block == "00" {
                    None
                } else {
                    Some(Increment {
                        number: i as i64 + 1,
                        factor: block[..1].to_string(),
                        direction: block[1..].to_string(),
                    })
                }
            })
            .collect();

        Ok(ClassCode {
            code: code.to_string(),
            oneg: code[..4].to_string(),
            increments,
        })
    }
}
