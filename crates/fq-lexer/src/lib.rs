#![forbid(unsafe_code)]

pub mod classify;

use fq_runtime::{DiagnosticKind, DiagnosticLedger, EnginePolicy};
use fq_types::{Token, TokenKind};
use thiserror::Error;

pub use classify::{
    is_bracket, is_close_bracket, is_conjunction, is_function, is_key, is_multi_value_operator,
    is_negation, is_non_value_operator, is_open_bracket, is_operator, is_value,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
    #[error("unterminated quoted text starting at offset {start}")]
    UnterminatedQuote { start: usize, quote: char },
    #[error("unexpected character {ch:?} at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },
}

impl LexError {
    #[must_use]
    pub fn offset(&self) -> usize {
        match self {
            Self::UnterminatedQuote { start, .. } => *start,
            Self::UnexpectedChar { offset, .. } => *offset,
        }
    }
}

/// Keywords in rule order; longer spellings are listed alongside their
/// prefixes and win by length.
const KEYWORDS: &[(&str, TokenKind)] = &[
    ("like", TokenKind::Like),
    ("ilike", TokenKind::ILike),
    ("between", TokenKind::Between),
    ("exists", TokenKind::Exists),
    ("exist", TokenKind::Exists),
    ("regexp", TokenKind::Regexp),
    ("contains", TokenKind::Contains),
    ("contain", TokenKind::Contains),
    ("in", TokenKind::In),
    ("not", TokenKind::Not),
    ("and", TokenKind::And),
    ("or", TokenKind::Or),
    ("hastoken", TokenKind::HasToken),
    ("has", TokenKind::Has),
    ("hasany", TokenKind::HasAny),
    ("hasall", TokenKind::HasAll),
    ("true", TokenKind::Bool),
    ("false", TokenKind::Bool),
];

fn is_ws(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

fn is_freetext_char(c: char) -> bool {
    !matches!(
        c,
        ' ' | '\t' | '\r' | '\n' | '=' | '(' | ')' | '\'' | '"' | '<' | '>' | '!' | '[' | ']' | ','
    )
}

fn is_segment_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '$' || c == '_'
}

fn is_segment_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '$' | '_' | ':' | '-')
}

struct Scanner {
    chars: Vec<char>,
}

impl Scanner {
    fn at(&self, i: usize) -> Option<char> {
        self.chars.get(i).copied()
    }

    fn starts_with_ignore_case(&self, i: usize, word: &str) -> bool {
        let mut offset = i;
        for expected in word.chars() {
            match self.at(offset) {
                Some(c) if c.to_ascii_lowercase() == expected => offset += 1,
                _ => return false,
            }
        }
        true
    }

    fn keyword_len(&self, i: usize) -> Option<(usize, TokenKind)> {
        let mut best: Option<(usize, TokenKind)> = None;
        for (word, kind) in KEYWORDS {
            let len = word.len();
            if self.starts_with_ignore_case(i, word) && best.is_none_or(|(best_len, _)| len > best_len)
            {
                best = Some((len, *kind));
            }
        }
        best
    }

    fn digits_from(&self, mut i: usize) -> usize {
        let start = i;
        while self.at(i).is_some_and(|c| c.is_ascii_digit()) {
            i += 1;
        }
        i - start
    }

    fn number_len(&self, i: usize) -> Option<usize> {
        let mut j = i;
        if matches!(self.at(j), Some('-' | '+')) {
            j += 1;
        }
        let int_digits = self.digits_from(j);
        j += int_digits;
        if int_digits == 0 {
            if self.at(j) != Some('.') {
                return None;
            }
            let frac = self.digits_from(j + 1);
            if frac == 0 {
                return None;
            }
            j += 1 + frac;
        } else if self.at(j) == Some('.') {
            j += 1 + self.digits_from(j + 1);
        }
        if matches!(self.at(j), Some('e' | 'E')) {
            let mut k = j + 1;
            if matches!(self.at(k), Some('-' | '+')) {
                k += 1;
            }
            let exp = self.digits_from(k);
            if exp > 0 {
                j = k + exp;
            }
        }
        Some(j - i)
    }

    fn segment_len(&self, i: usize) -> usize {
        if !self.at(i).is_some_and(is_segment_start) {
            return 0;
        }
        let mut j = i + 1;
        while self.at(j).is_some_and(is_segment_char) {
            j += 1;
        }
        j - i
    }

    /// `segment ('.' segment | '[]' | '[*]')*`
    fn key_len(&self, i: usize) -> Option<usize> {
        let first = self.segment_len(i);
        if first == 0 {
            return None;
        }
        let mut j = i + first;
        loop {
            match (self.at(j), self.at(j + 1), self.at(j + 2)) {
                (Some('.'), _, _) => {
                    let next = self.segment_len(j + 1);
                    if next == 0 {
                        break;
                    }
                    j += 1 + next;
                }
                (Some('['), Some(']'), _) => j += 2,
                (Some('['), Some('*'), Some(']')) => j += 3,
                _ => break,
            }
        }
        Some(j - i)
    }

    fn freetext_len(&self, i: usize) -> usize {
        let mut j = i;
        while self.at(j).is_some_and(is_freetext_char) {
            j += 1;
        }
        j - i
    }

    fn quoted_len(&self, i: usize, quote: char) -> Result<usize, LexError> {
        let mut j = i + 1;
        while let Some(c) = self.at(j) {
            if c == '\\' {
                j += 2;
                continue;
            }
            if c == quote {
                return Ok(j + 1 - i);
            }
            j += 1;
        }
        Err(LexError::UnterminatedQuote { start: i, quote })
    }

    /// Longest match at `i`; ties go to the rule listed first.
    fn next_match(&self, i: usize) -> Result<(usize, TokenKind), LexError> {
        let Some(c) = self.at(i) else {
            return Ok((0, TokenKind::Eof));
        };
        if is_ws(c) {
            let mut j = i;
            while self.at(j).is_some_and(is_ws) {
                j += 1;
            }
            return Ok((j - i, TokenKind::Whitespace));
        }
        let next = self.at(i + 1);
        let fixed = match c {
            '(' => Some((1, TokenKind::LParen)),
            ')' => Some((1, TokenKind::RParen)),
            '[' => Some((1, TokenKind::LBrack)),
            ']' => Some((1, TokenKind::RBrack)),
            ',' => Some((1, TokenKind::Comma)),
            '=' if next == Some('=') => Some((2, TokenKind::Equals)),
            '=' => Some((1, TokenKind::Equals)),
            '!' if next == Some('=') => Some((2, TokenKind::NotEquals)),
            '!' => return Err(LexError::UnexpectedChar { ch: c, offset: i }),
            '<' if next == Some('=') => Some((2, TokenKind::Le)),
            '<' if next == Some('>') => Some((2, TokenKind::Neq)),
            '<' => Some((1, TokenKind::Lt)),
            '>' if next == Some('=') => Some((2, TokenKind::Ge)),
            '>' => Some((1, TokenKind::Gt)),
            '\'' | '"' => Some((self.quoted_len(i, c)?, TokenKind::QuotedText)),
            _ => None,
        };
        if let Some(found) = fixed {
            return Ok(found);
        }

        let candidates = [
            self.keyword_len(i),
            self.number_len(i).map(|len| (len, TokenKind::Number)),
            self.key_len(i).map(|len| (len, TokenKind::Key)),
            Some((self.freetext_len(i), TokenKind::FreeText)),
        ];
        let mut best = (0, TokenKind::FreeText);
        for (len, kind) in candidates.into_iter().flatten() {
            if len > best.0 {
                best = (len, kind);
            }
        }
        if best.0 == 0 {
            return Err(LexError::UnexpectedChar { ch: c, offset: i });
        }
        Ok(best)
    }
}

fn run(
    input: &str,
    policy: Option<&EnginePolicy>,
    mut ledger: Option<&mut DiagnosticLedger>,
) -> Result<Vec<Token>, LexError> {
    let scanner = Scanner {
        chars: input.chars().collect(),
    };
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < scanner.chars.len() {
        match scanner.next_match(i) {
            Ok((len, kind)) => {
                let text: String = scanner.chars[i..i + len].iter().collect();
                tokens.push(Token::new(kind, text, i, i + len - 1));
                i += len;
            }
            Err(LexError::UnexpectedChar { ch, offset }) => match (policy, ledger.as_deref_mut()) {
                (Some(policy), Some(ledger)) if !policy.is_strict() => {
                    policy.record(
                        DiagnosticKind::SkippedCharacter,
                        input,
                        format!("skipped {ch:?} at offset {offset}"),
                        ledger,
                    );
                    i += 1;
                }
                (Some(policy), None) if !policy.is_strict() => i += 1,
                _ => return Err(LexError::UnexpectedChar { ch, offset }),
            },
            Err(err) => return Err(err),
        }
    }
    tokens.push(Token::eof(scanner.chars.len()));
    Ok(tokens)
}

/// Tokenizes with strict error handling: any character no rule accepts is an
/// error.
pub fn try_tokenize(input: &str) -> Result<Vec<Token>, LexError> {
    run(input, None, None)
}

/// Tokenizes under `policy`. In hardened mode unrecognised characters are
/// skipped and recorded in `ledger`; an unterminated quote is always an error.
pub fn tokenize_with_policy(
    input: &str,
    policy: &EnginePolicy,
    ledger: &mut DiagnosticLedger,
) -> Result<Vec<Token>, LexError> {
    run(input, Some(policy), Some(ledger))
}

/// Tokens the parser sees: whitespace and the trailing EOF removed.
#[must_use]
pub fn significant(tokens: &[Token]) -> Vec<&Token> {
    tokens
        .iter()
        .filter(|token| !token.is_hidden() && !token.is_eof())
        .collect()
}

#[cfg(test)]
mod tests {
    use fq_runtime::{DiagnosticKind, DiagnosticLedger, EnginePolicy};
    use fq_types::TokenKind;
    use proptest::prelude::*;

    use super::{LexError, significant, tokenize_with_policy, try_tokenize};

    fn kinds(input: &str) -> Vec<TokenKind> {
        let tokens = try_tokenize(input).expect("tokenize");
        significant(&tokens).iter().map(|t| t.kind).collect()
    }

    #[test]
    fn simple_comparison_has_exact_offsets() {
        let tokens = try_tokenize("service.name = 'adservice'").expect("tokenize");
        let sig = significant(&tokens);
        assert_eq!(sig.len(), 3);
        assert_eq!(sig[0].kind, TokenKind::Key);
        assert_eq!((sig[0].start, sig[0].stop), (0, 11));
        assert_eq!(sig[1].kind, TokenKind::Equals);
        assert_eq!((sig[1].start, sig[1].stop), (13, 13));
        assert_eq!(sig[2].kind, TokenKind::QuotedText);
        assert_eq!(sig[2].text, "'adservice'");
        assert_eq!((sig[2].start, sig[2].stop), (15, 25));
        assert!(tokens.last().expect("eof").is_eof());
    }

    #[test]
    fn whitespace_is_kept_on_hidden_channel() {
        let tokens = try_tokenize("a  =\t1").expect("tokenize");
        let ws: Vec<_> = tokens.iter().filter(|t| t.is_hidden()).collect();
        assert_eq!(ws.len(), 2);
        assert_eq!((ws[0].start, ws[0].stop), (1, 2));
        assert_eq!(ws[0].kind, TokenKind::Whitespace);
    }

    #[test]
    fn keywords_are_case_insensitive_and_lose_to_longer_keys() {
        assert_eq!(
            kinds("a In [1] and b NOT exist or c contain 'x'"),
            vec![
                TokenKind::Key,
                TokenKind::In,
                TokenKind::LBrack,
                TokenKind::Number,
                TokenKind::RBrack,
                TokenKind::And,
                TokenKind::Key,
                TokenKind::Not,
                TokenKind::Exists,
                TokenKind::Or,
                TokenKind::Key,
                TokenKind::Contains,
                TokenKind::QuotedText,
            ]
        );
        assert_eq!(kinds("inbox = notes"), vec![TokenKind::Key, TokenKind::Equals, TokenKind::Key]);
        assert_eq!(kinds("TRUE"), vec![TokenKind::Bool]);
    }

    #[test]
    fn function_keywords_pick_longest_spelling() {
        assert_eq!(
            kinds("hasAny(tags, ['a']) hasToken(body, 'x') has(t, 'y')"),
            vec![
                TokenKind::HasAny,
                TokenKind::LParen,
                TokenKind::Key,
                TokenKind::Comma,
                TokenKind::LBrack,
                TokenKind::QuotedText,
                TokenKind::RBrack,
                TokenKind::RParen,
                TokenKind::HasToken,
                TokenKind::LParen,
                TokenKind::Key,
                TokenKind::Comma,
                TokenKind::QuotedText,
                TokenKind::RParen,
                TokenKind::Has,
                TokenKind::LParen,
                TokenKind::Key,
                TokenKind::Comma,
                TokenKind::QuotedText,
                TokenKind::RParen,
            ]
        );
    }

    #[test]
    fn comparison_operators_take_two_char_forms() {
        assert_eq!(
            kinds("a == 1 b != 2 c <> 3 d <= 4 e >= 5 f < 6 g > 7"),
            vec![
                TokenKind::Key,
                TokenKind::Equals,
                TokenKind::Number,
                TokenKind::Key,
                TokenKind::NotEquals,
                TokenKind::Number,
                TokenKind::Key,
                TokenKind::Neq,
                TokenKind::Number,
                TokenKind::Key,
                TokenKind::Le,
                TokenKind::Number,
                TokenKind::Key,
                TokenKind::Ge,
                TokenKind::Number,
                TokenKind::Key,
                TokenKind::Lt,
                TokenKind::Number,
                TokenKind::Key,
                TokenKind::Gt,
                TokenKind::Number,
            ]
        );
    }

    #[test]
    fn keys_accept_variables_dots_and_array_suffixes() {
        let tokens = try_tokenize("$deployment.environment tags[] items[*].name k8s:pod-name")
            .expect("tokenize");
        let texts: Vec<_> = significant(&tokens).iter().map(|t| t.text.clone()).collect();
        assert_eq!(
            texts,
            vec![
                "$deployment.environment",
                "tags[]",
                "items[*].name",
                "k8s:pod-name"
            ]
        );
        assert!(significant(&tokens).iter().all(|t| t.kind == TokenKind::Key));
    }

    #[test]
    fn numbers_allow_sign_fraction_and_exponent() {
        for text in ["-42", "3.14", ".5", "1e9", "2.5E-3", "+7"] {
            assert_eq!(kinds(text), vec![TokenKind::Number], "{text}");
        }
        assert_eq!(kinds("123abc"), vec![TokenKind::FreeText]);
    }

    #[test]
    fn free_text_covers_unkeyable_runs() {
        assert_eq!(kinds("user@example.com"), vec![TokenKind::FreeText]);
        assert_eq!(kinds("héllo"), vec![TokenKind::FreeText]);
    }

    #[test]
    fn quoted_text_honours_backslash_escapes() {
        let tokens = try_tokenize(r#"msg = 'user\'s data' AND b = "x""#).expect("tokenize");
        let sig = significant(&tokens);
        assert_eq!(sig[2].text, r"'user\'s data'");
        assert_eq!(sig[6].kind, TokenKind::QuotedText);
        assert_eq!(sig[6].text, "\"x\"");
    }

    #[test]
    fn unterminated_quote_is_always_an_error() {
        let err = try_tokenize("status = 'err").expect_err("unterminated");
        assert_eq!(
            err,
            LexError::UnterminatedQuote {
                start: 9,
                quote: '\''
            }
        );
        let mut ledger = DiagnosticLedger::new();
        assert!(tokenize_with_policy("a = \"x", &EnginePolicy::hardened(), &mut ledger).is_err());
    }

    #[test]
    fn lone_bang_is_strict_error_and_hardened_skip() {
        assert_eq!(
            try_tokenize("a ! b").expect_err("bang"),
            LexError::UnexpectedChar { ch: '!', offset: 2 }
        );

        let mut ledger = DiagnosticLedger::new();
        let strict = tokenize_with_policy("a ! b", &EnginePolicy::strict(), &mut ledger);
        assert!(strict.is_err());
        assert!(ledger.is_empty());

        let tokens = tokenize_with_policy("a ! b", &EnginePolicy::hardened(), &mut ledger)
            .expect("hardened");
        let sig = significant(&tokens);
        assert_eq!(sig.len(), 2);
        assert_eq!(sig[1].start, 4);
        assert_eq!(ledger.count(DiagnosticKind::SkippedCharacter), 1);
    }

    #[test]
    fn offsets_count_characters_not_bytes() {
        let tokens = try_tokenize("name = 'zoë' AND x = 1").expect("tokenize");
        let sig = significant(&tokens);
        assert_eq!((sig[2].start, sig[2].stop), (7, 11));
        assert_eq!(sig[3].start, 13);
    }

    #[test]
    fn empty_input_yields_only_eof() {
        let tokens = try_tokenize("").expect("tokenize");
        assert_eq!(tokens.len(), 1);
        assert!(tokens[0].is_eof());
    }

    proptest! {
        #[test]
        fn tokens_tile_the_input_without_gaps(input in "[a-z0-9 ._=<>'\\[\\](),-]{0,40}") {
            if let Ok(tokens) = try_tokenize(&input) {
                let mut expected_start = 0;
                for token in tokens.iter().filter(|t| !t.is_eof()) {
                    prop_assert_eq!(token.start, expected_start);
                    prop_assert!(token.stop >= token.start);
                    prop_assert_eq!(token.text.chars().count(), token.stop - token.start + 1);
                    expected_start = token.stop + 1;
                }
                prop_assert_eq!(expected_start, input.chars().count());
            }
        }
    }
}
