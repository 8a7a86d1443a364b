use nom_locate::LocatedSpan;

pub type Span<'a> = LocatedSpan<&'a str>;

#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Hash)]
pub struct Position {
    pub line: u32,
    pub column: usize,
}

impl Default for Position {
    fn default() -> Self {
        Position { line: 1, column: 1 }
    }
}

impl Position {
    pub fn new(line: u32, column: usize) -> Self {
        Position { line, column }
    }

    /// Byte offset of this position within `source`.
    ///
    /// `column` counts characters, so the offset walks the line char by char.
    pub fn byte_offset(&self, source: &str) -> usize {
        let mut offset = 0;
        for (i, line) in source.split_inclusive('\n').enumerate() {
            if i + 1 == self.line as usize {
                return offset
                    + line
                        .char_indices()
                        .nth(self.column.saturating_sub(1))
                        .map(|(o, _)| o)
                        .unwrap_or(line.len());
            }
            offset += line.len();
        }
        source.len()
    }
}

#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Default, Hash)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    /// `(start, end)` byte offsets of this range within `source`.
    pub fn byte_span(&self, source: &str) -> (usize, usize) {
        (self.start.byte_offset(source), self.end.byte_offset(source))
    }
}

impl<'a> From<Span<'a>> for Range {
    fn from(span: Span<'a>) -> Self {
        Range {
            start: Position {
                line: span.location_line(),
                column: span.get_utf8_column(),
            },
            end: Position {
                line: span.location_line(),
                column: span.get_utf8_column() + span.fragment().chars().count(),
            },
        }
    }
}

impl<'a> From<Span<'a>> for Position {
    fn from(span: Span<'a>) -> Self {
        Position {
            line: span.location_line(),
            column: span.get_utf8_column(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1 + 2", Position::new(1, 1), 0)]
    #[case("1 + 2", Position::new(1, 5), 4)]
    #[case("a\nbc", Position::new(2, 2), 3)]
    #[case("a\nbc", Position::new(2, 3), 4)]
    fn test_byte_offset(#[case] source: &str, #[case] position: Position, #[case] expected: usize) {
        assert_eq!(position.byte_offset(source), expected);
    }

    #[test]
    fn test_byte_span() {
        let range = Range {
            start: Position::new(1, 3),
            end: Position::new(1, 6),
        };
        assert_eq!(range.byte_span("ab[cd]"), (2, 5));
    }
}
