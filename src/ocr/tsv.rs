//! Tesseract TSV output parsing
//!
//! Columns: `level page_num block_num par_num line_num word_num left top
//! width height conf text`. Only level-5 (word) rows carry text.

use crate::document::{Quad, Rect};

use super::types::{OcrError, OcrWord};

const WORD_LEVEL: &str = "5";
const COLUMNS: usize = 12;

/// Parse word rows, dropping blank words and those below `min_confidence`
pub fn parse_tsv(tsv: &str, min_confidence: f32) -> Result<Vec<OcrWord>, OcrError> {
    let mut words = Vec::new();

    for (line_no, line) in tsv.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with("level") {
            continue;
        }

        let fields: Vec<&str> = line.splitn(COLUMNS, '\t').collect();
        if fields.len() < COLUMNS - 1 {
            return Err(OcrError::ParseError(format!(
                "line {}: expected {} columns, got {}",
                line_no + 1,
                COLUMNS,
                fields.len()
            )));
        }
        if fields[0] != WORD_LEVEL {
            continue;
        }

        let text = fields.get(11).map(|t| t.trim()).unwrap_or_default();
        if text.is_empty() {
            continue;
        }

        let int = |i: usize| -> Result<i64, OcrError> {
            fields[i].trim().parse::<i64>().map_err(|_| {
                OcrError::ParseError(format!("line {}: bad integer '{}'", line_no + 1, fields[i]))
            })
        };
        let confidence = fields[10].trim().parse::<f32>().map_err(|_| {
            OcrError::ParseError(format!("line {}: bad confidence '{}'", line_no + 1, fields[10]))
        })?;
        if confidence < min_confidence {
            continue;
        }

        let rect = Rect::new(int(6)? as f32, int(7)? as f32, int(8)? as f32, int(9)? as f32);
        if rect.is_empty() {
            continue;
        }

        words.push(OcrWord {
            text: text.to_string(),
            confidence: confidence.max(0.0),
            quad: Quad::from_rect(&rect),
            line: (int(2)? as u32, int(3)? as u32, int(4)? as u32),
        });
    }

    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t800\t600\t-1\t
2\t1\t1\t0\t0\t0\t40\t30\t300\t40\t-1\t
4\t1\t1\t1\t1\t0\t40\t30\t300\t40\t-1\t
5\t1\t1\t1\t1\t1\t40\t30\t120\t40\t96.5\tHello
5\t1\t1\t1\t1\t2\t180\t30\t160\t40\t91\t世界
5\t1\t1\t1\t1\t3\t360\t30\t20\t40\t12\t~
5\t1\t1\t1\t1\t4\t400\t30\t20\t40\t95\t \r
";

    #[test]
    fn test_parse_word_rows() {
        let words = parse_tsv(SAMPLE, 0.0).unwrap();
        assert_eq!(words.len(), 3);
        assert_eq!(words[0].text, "Hello");
        assert_eq!(words[0].quad.ul.x, 40.0);
        assert_eq!(words[0].quad.lr.y, 70.0);
        assert_eq!(words[1].text, "世界");
        assert_eq!(words[1].line, (1, 1, 1));
    }

    #[test]
    fn test_min_confidence() {
        let words = parse_tsv(SAMPLE, 50.0).unwrap();
        let texts: Vec<&str> = words.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(texts, vec!["Hello", "世界"]);
    }

    #[test]
    fn test_malformed_rows() {
        assert!(parse_tsv("", 0.0).unwrap().is_empty());
        assert!(matches!(
            parse_tsv("5\t1\t1", 0.0),
            Err(OcrError::ParseError(_))
        ));
        assert!(matches!(
            parse_tsv("5\t1\t1\t1\t1\t1\tx\t30\t120\t40\t96\tHi", 0.0),
            Err(OcrError::ParseError(_))
        ));
    }
}
