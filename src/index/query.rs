//! Boolean query evaluation: infix `AND` / `OR` with parentheses, evaluated
//! with the shunting-yard algorithm directly over posting bitmaps.
//!
//! `AND` binds tighter than `OR`; both are left-associative. Terms are
//! analyzed with the same chain as documents before their postings are
//! loaded, so `running` and `run` resolve to the same posting list.

use roaring::RoaringBitmap;

use super::InvertedIndex;
use crate::errinput;
use crate::error::Result;

/// A lexed query element. Operator words are recognized case-insensitively;
/// everything else alphanumeric is a search term.
#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open,
    Close,
    And,
    Or,
    Term(String),
}

impl InvertedIndex {
    /// Evaluates a boolean query and returns the matching document ids in
    /// ascending order.
    pub fn search(&self, query: &str) -> Result<Vec<u32>> {
        let tokens = lex(query);
        if tokens.is_empty() {
            return errinput!("empty query");
        }

        let mut values: Vec<RoaringBitmap> = Vec::new();
        let mut operators: Vec<Token> = Vec::new();
        let mut expect_value = true;

        for token in tokens {
            match token {
                Token::Open => {
                    if !expect_value {
                        return errinput!("unexpected token \"(\"");
                    }
                    operators.push(Token::Open);
                }
                Token::Close => {
                    if expect_value {
                        return errinput!("unexpected token \")\"");
                    }
                    let mut found_open = false;
                    while let Some(top) = operators.pop() {
                        if top == Token::Open {
                            found_open = true;
                            break;
                        }
                        apply_operator(&top, &mut values)?;
                    }
                    if !found_open {
                        return errinput!("missing opening parenthesis");
                    }
                }
                Token::And | Token::Or => {
                    if expect_value {
                        return errinput!("unexpected operator {token:?}");
                    }
                    while operators
                        .last()
                        .is_some_and(|top| *top != Token::Open && precedence(top) >= precedence(&token))
                    {
                        let Some(top) = operators.pop() else { break };
                        apply_operator(&top, &mut values)?;
                    }
                    operators.push(token);
                    expect_value = true;
                }
                Token::Term(word) => {
                    if !expect_value {
                        return errinput!("unexpected term {word:?}");
                    }
                    values.push(self.term_bitmap(&word));
                    expect_value = false;
                }
            }
        }

        if expect_value {
            return errinput!("unexpected end of query");
        }
        while let Some(top) = operators.pop() {
            if top == Token::Open {
                return errinput!("missing closing parenthesis");
            }
            apply_operator(&top, &mut values)?;
        }
        if values.len() != 1 {
            return errinput!("invalid query");
        }

        Ok(values.remove(0).iter().collect())
    }

    /// Posting bitmap for one query word, after analysis. Words that analyze
    /// to nothing (stopwords, punctuation) match no documents.
    fn term_bitmap(&self, word: &str) -> RoaringBitmap {
        match self.normalize_word(word) {
            Some(term) => self.load_posting(&term),
            None => RoaringBitmap::new(),
        }
    }
}

fn apply_operator(operator: &Token, values: &mut Vec<RoaringBitmap>) -> Result<()> {
    let (Some(right), Some(mut left)) = (values.pop(), values.pop()) else {
        return errinput!("unexpected operator {operator:?}");
    };
    match operator {
        Token::And => left &= right,
        Token::Or => left |= right,
        _ => return errinput!("unknown operator {operator:?}"),
    }
    values.push(left);
    Ok(())
}

fn precedence(operator: &Token) -> u8 {
    match operator {
        Token::And => 2,
        Token::Or => 1,
        _ => 0,
    }
}

/// Splits a query into terms, operators, and parentheses. Alphanumeric runs
/// form words; `and` / `or` in any case become operators; parentheses stand
/// alone; every other character is a separator.
fn lex(query: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut current = String::new();

    fn flush(tokens: &mut Vec<Token>, current: &mut String) {
        if current.is_empty() {
            return;
        }
        let word = std::mem::take(current);
        match word.to_uppercase().as_str() {
            "AND" => tokens.push(Token::And),
            "OR" => tokens.push(Token::Or),
            _ => tokens.push(Token::Term(word)),
        }
    }

    for ch in query.chars() {
        match ch {
            _ if ch.is_alphanumeric() => current.push(ch),
            '(' => {
                flush(&mut tokens, &mut current);
                tokens.push(Token::Open);
            }
            ')' => {
                flush(&mut tokens, &mut current);
                tokens.push(Token::Close);
            }
            _ => flush(&mut tokens, &mut current),
        }
    }
    flush(&mut tokens, &mut current);
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LsmConfig;
    use crate::error::Error;
    use tempfile::TempDir;

    fn test_index(dir: &TempDir) -> InvertedIndex {
        InvertedIndex::with_config(LsmConfig::new(dir.path()).max_memtable_entries(2))
    }

    #[test]
    fn test_lex_operators_and_parentheses() {
        assert_eq!(
            lex("(run OR bloom) and bitmap"),
            vec![
                Token::Open,
                Token::Term("run".to_string()),
                Token::Or,
                Token::Term("bloom".to_string()),
                Token::Close,
                Token::And,
                Token::Term("bitmap".to_string()),
            ]
        );
        assert_eq!(lex("  ,;  "), Vec::<Token>::new());
    }

    #[tokio::test]
    async fn test_boolean_queries() {
        let dir = TempDir::new().unwrap();
        let index = test_index(&dir);

        index.add_document(1, "running fast with maps");
        index.add_document(2, "run bloom filter");
        index.add_document(3, "roaring bitmap index bloom");
        index.add_document(4, "maps bitmap");

        assert_eq!(index.search("run AND map").unwrap(), vec![1]);
        assert_eq!(index.search("run OR bitmap").unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(index.search("(run OR bloom) AND bitmap").unwrap(), vec![3]);
    }

    #[tokio::test]
    async fn test_single_term_query() {
        let dir = TempDir::new().unwrap();
        let index = test_index(&dir);

        index.add_document(7, "bloom filter");
        assert_eq!(index.search("bloom").unwrap(), vec![7]);
        assert_eq!(index.search("absent").unwrap(), Vec::<u32>::new());
    }

    #[tokio::test]
    async fn test_precedence_and_binds_tighter() {
        let dir = TempDir::new().unwrap();
        let index = test_index(&dir);

        index.add_document(1, "alpha");
        index.add_document(2, "beta gamma");

        // alpha OR (beta AND gamma), not (alpha OR beta) AND gamma.
        assert_eq!(index.search("alpha OR beta AND gamma").unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_malformed_queries_error() {
        let dir = TempDir::new().unwrap();
        let index = test_index(&dir);
        index.add_document(1, "run map");

        for query in ["", "run OR", "(run OR map", "run OR map)", "AND run", "run map"] {
            match index.search(query) {
                Err(Error::InvalidInput(_)) => {}
                other => panic!("query {query:?} must fail with InvalidInput, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_compact_then_query() {
        let dir = TempDir::new().unwrap();
        let index = test_index(&dir);

        index.add_document(1, "running map");
        index.add_document(2, "run bloom");
        index.add_document(3, "map bloom");
        index.compact().await.unwrap();

        assert_eq!(index.search("run AND bloom").unwrap(), vec![2]);
    }
}
