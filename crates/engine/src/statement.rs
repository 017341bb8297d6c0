use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use spendiq_core::{StatementDetails, Transaction};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatementError {
    #[error("Unsupported statement: {0}")]
    Unsupported(String),
    #[error("Malformed statement JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Statement contains no transactions")]
    Empty,
}

/// Parser output: the transactions plus whatever header metadata was found.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedStatement {
    pub transactions: Vec<Transaction>,
    #[serde(default, alias = "statement_details")]
    pub statement_details: Option<StatementDetails>,
}

#[async_trait]
pub trait StatementParser: Send + Sync {
    async fn parse(&self, document: &[u8]) -> Result<ParsedStatement, StatementError>;
}

/// Reads statements that were already extracted to JSON, either the full
/// `{transactions, statementDetails}` object or a bare transaction array.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonStatementParser;

#[derive(Deserialize)]
#[serde(untagged)]
enum Document {
    Full(ParsedStatement),
    Bare(Vec<Transaction>),
}

#[async_trait]
impl StatementParser for JsonStatementParser {
    async fn parse(&self, document: &[u8]) -> Result<ParsedStatement, StatementError> {
        let trimmed = document.trim_ascii_start();
        match trimmed.first() {
            Some(b'{') | Some(b'[') => {}
            _ => return Err(StatementError::Unsupported("expected a JSON object or array".into())),
        }
        // Parse strictly first so a malformed document reports serde's own error.
        let value: serde_json::Value = serde_json::from_slice(trimmed)?;
        let mut statement = match serde_json::from_value(value)? {
            Document::Full(statement) => statement,
            Document::Bare(transactions) => ParsedStatement {
                transactions,
                statement_details: None,
            },
        };
        if statement.transactions.is_empty() {
            return Err(StatementError::Empty);
        }
        if statement.statement_details.as_ref().is_some_and(StatementDetails::is_empty) {
            statement.statement_details = None;
        }
        tracing::debug!(transactions = statement.transactions.len(), "parsed statement");
        Ok(statement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spendiq_core::Direction;

    #[tokio::test]
    async fn parses_full_document() {
        let json = br#"{
            "transactions": [
                {"date": "02/01/2026", "title": "Cumparare POS", "merchant": "Lidl",
                 "amount": -12.5, "direction": "debit", "raw_lines": ["Terminal: LIDL"]}
            ],
            "statementDetails": {"accountHolder": "Jane Doe", "statementPeriod": "01/01/2026 - 31/01/2026"}
        }"#;
        let parsed = JsonStatementParser.parse(json).await.unwrap();
        assert_eq!(parsed.transactions.len(), 1);
        let tx = &parsed.transactions[0];
        assert_eq!(tx.direction, Direction::Debit);
        assert_eq!(tx.raw_lines, vec!["Terminal: LIDL".to_string()]);
        let details = parsed.statement_details.unwrap();
        assert_eq!(details.account_holder.as_deref(), Some("Jane Doe"));
        assert_eq!(details.account_number, None);
    }

    #[tokio::test]
    async fn parses_bare_array() {
        let json = br#"[{"date": "d", "title": "t", "merchant": "m", "amount": null, "direction": "credit"}]"#;
        let parsed = JsonStatementParser.parse(json).await.unwrap();
        assert_eq!(parsed.transactions[0].amount, None);
        assert!(parsed.statement_details.is_none());
    }

    #[tokio::test]
    async fn empty_details_become_none() {
        let json = br#"{"transactions": [{"date": "d", "direction": "debit"}], "statementDetails": {}}"#;
        let parsed = JsonStatementParser.parse(json).await.unwrap();
        assert!(parsed.statement_details.is_none());
    }

    #[tokio::test]
    async fn rejects_non_json_and_empty() {
        assert!(matches!(
            JsonStatementParser.parse(b"%PDF-1.7").await,
            Err(StatementError::Unsupported(_))
        ));
        assert!(matches!(
            JsonStatementParser.parse(b"[]").await,
            Err(StatementError::Empty)
        ));
        assert!(matches!(
            JsonStatementParser.parse(b"{\"transactions\": ").await,
            Err(StatementError::Json(_))
        ));
    }
}
