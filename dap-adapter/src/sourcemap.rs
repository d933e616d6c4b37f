// Source map position translation
//
// Translates between authored coordinates (what the editor shows) and
// executed coordinates (what the engine runs) using the inline source map
// a transpiled script advertises. All coordinates here are 0-based; the
// DAP boundary owns 1-based conversion.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;
use tracing::debug;

/// Outcome of a position translation.
///
/// `verified` is true only when the position came from an actual mapping;
/// identity translation makes no verification claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslatedPosition {
    pub line: i64,
    pub column: i64,
    pub verified: bool,
}

/// One decoded mapping segment.
#[derive(Debug, Clone, Copy)]
struct Mapping {
    generated_line: i64,
    generated_column: i64,
    source: usize,
    source_line: i64,
    source_column: i64,
}

/// Translator between authored and executed coordinates.
#[derive(Debug, Clone)]
pub enum PositionTranslator {
    /// Untranspiled script: positions pass through unchanged.
    Identity,
    Mapped(SourceMap),
}

impl PositionTranslator {
    pub fn identity() -> Self {
        PositionTranslator::Identity
    }

    /// Build a translator from a `sourceMapURL`.
    ///
    /// Only inline `data:` URLs are supported; anything else, and any
    /// parse failure, degrades to the identity translator so a broken map
    /// never breaks the session.
    pub fn from_source_map_url(url: &str) -> Self {
        match SourceMap::parse_data_url(url) {
            Some(map) => PositionTranslator::Mapped(map),
            None => PositionTranslator::Identity,
        }
    }

    /// Authored position -> executed position. `path` picks the authored
    /// source when the map references several.
    pub fn to_executed(&self, line: i64, column: i64, path: Option<&str>) -> TranslatedPosition {
        match self {
            PositionTranslator::Identity => TranslatedPosition {
                line,
                column,
                verified: false,
            },
            PositionTranslator::Mapped(map) => map.to_executed(line, column, path),
        }
    }

    /// Executed position -> authored position.
    pub fn to_authored(&self, line: i64, column: i64) -> TranslatedPosition {
        match self {
            PositionTranslator::Identity => TranslatedPosition {
                line,
                column,
                verified: false,
            },
            PositionTranslator::Mapped(map) => map.to_authored(line, column),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SourceMap {
    sources: Vec<String>,
    /// Sorted by generated position.
    by_generated: Vec<Mapping>,
    /// Sorted by (source, source position).
    by_source: Vec<Mapping>,
}

#[derive(Deserialize)]
struct RawSourceMap {
    #[serde(default)]
    version: i64,
    #[serde(default)]
    sources: Vec<String>,
    #[serde(default)]
    mappings: String,
}

impl SourceMap {
    fn parse_data_url(url: &str) -> Option<SourceMap> {
        let payload = url.strip_prefix("data:")?;
        let (_, encoded) = payload.split_once("base64,")?;

        let bytes = match STANDARD.decode(encoded.trim()) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("Ignoring undecodable source map: {}", e);
                return None;
            }
        };

        let raw: RawSourceMap = match serde_json::from_slice(&bytes) {
            Ok(raw) => raw,
            Err(e) => {
                debug!("Ignoring unparseable source map: {}", e);
                return None;
            }
        };

        if raw.version != 3 {
            debug!("Ignoring source map with version {}", raw.version);
            return None;
        }

        let mappings = decode_mappings(&raw.mappings, raw.sources.len())?;
        if mappings.is_empty() {
            return None;
        }

        let mut by_generated = mappings.clone();
        by_generated.sort_by_key(|m| (m.generated_line, m.generated_column));

        let mut by_source = mappings;
        by_source.sort_by_key(|m| (m.source, m.source_line, m.source_column));

        Some(SourceMap {
            sources: raw.sources,
            by_generated,
            by_source,
        })
    }

    /// Pick the authored source index for a path, by suffix match either
    /// way. Falls back to the first source.
    fn source_index(&self, path: Option<&str>) -> usize {
        let Some(path) = path else { return 0 };
        let normalized = path.replace('\\', "/");

        self.sources
            .iter()
            .position(|source| {
                let source = source.replace('\\', "/");
                normalized.ends_with(source.trim_start_matches("./"))
                    || source.ends_with(normalized.trim_start_matches("./"))
            })
            .unwrap_or(0)
    }

    fn to_executed(&self, line: i64, column: i64, path: Option<&str>) -> TranslatedPosition {
        let source = self.source_index(path);

        // Nearest mapping for this source at or after the requested
        // authored position, else the closest one before it.
        let idx = self
            .by_source
            .partition_point(|m| (m.source, m.source_line, m.source_column) < (source, line, column));

        let candidate = self
            .by_source
            .get(idx)
            .filter(|m| m.source == source)
            .or_else(|| {
                self.by_source[..idx]
                    .iter()
                    .rev()
                    .find(|m| m.source == source)
            });

        match candidate {
            Some(m) => TranslatedPosition {
                line: m.generated_line,
                column: m.generated_column,
                verified: true,
            },
            None => TranslatedPosition {
                line,
                column,
                verified: false,
            },
        }
    }

    fn to_authored(&self, line: i64, column: i64) -> TranslatedPosition {
        // Last mapping at or before the executed position.
        let idx = self
            .by_generated
            .partition_point(|m| (m.generated_line, m.generated_column) <= (line, column));

        match idx.checked_sub(1).map(|i| self.by_generated[i]) {
            Some(m) => TranslatedPosition {
                line: m.source_line,
                column: m.source_column,
                verified: true,
            },
            None => TranslatedPosition {
                line,
                column,
                verified: false,
            },
        }
    }

}

const VLQ_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

const VLQ_CONTINUATION: i64 = 0x20;

fn vlq_digit(byte: u8) -> Option<i64> {
    VLQ_ALPHABET.iter().position(|&c| c == byte).map(|p| p as i64)
}

/// Decode one base64-VLQ value, advancing the cursor.
fn decode_vlq(bytes: &[u8], cursor: &mut usize) -> Option<i64> {
    let mut result: i64 = 0;
    let mut shift = 0u32;

    loop {
        let digit = vlq_digit(*bytes.get(*cursor)?)?;
        *cursor += 1;

        // A value that keeps continuing past an i64's width is malformed.
        if shift >= 64 {
            return None;
        }
        result |= (digit & (VLQ_CONTINUATION - 1)) << shift;
        if digit & VLQ_CONTINUATION == 0 {
            break;
        }
        shift += 5;
    }

    // Low bit is the sign.
    let value = result >> 1;
    Some(if result & 1 == 1 { -value } else { value })
}

/// Decode a `mappings` string into segments that carry a source position.
fn decode_mappings(mappings: &str, source_count: usize) -> Option<Vec<Mapping>> {
    let mut decoded = Vec::new();

    let mut source: i64 = 0;
    let mut source_line: i64 = 0;
    let mut source_column: i64 = 0;

    for (generated_line, line) in mappings.split(';').enumerate() {
        let mut generated_column: i64 = 0;

        for segment in line.split(',') {
            if segment.is_empty() {
                continue;
            }

            let bytes = segment.as_bytes();
            let mut cursor = 0;

            generated_column += decode_vlq(bytes, &mut cursor)?;

            // 1-field segments map generated code to nothing.
            if cursor >= bytes.len() {
                continue;
            }

            source += decode_vlq(bytes, &mut cursor)?;
            source_line += decode_vlq(bytes, &mut cursor)?;
            source_column += decode_vlq(bytes, &mut cursor)?;
            // Optional 5th field (name index) is skipped.

            if source < 0 || source as usize >= source_count.max(1) {
                return None;
            }

            decoded.push(Mapping {
                generated_line: generated_line as i64,
                generated_column,
                source: source as usize,
                source_line,
                source_column,
            });
        }
    }

    Some(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test-side VLQ encoder for building mappings strings.
    fn encode_vlq(value: i64, out: &mut String) {
        let mut vlq = if value < 0 { ((-value) << 1) | 1 } else { value << 1 };
        loop {
            let mut digit = vlq & (VLQ_CONTINUATION - 1);
            vlq >>= 5;
            if vlq > 0 {
                digit |= VLQ_CONTINUATION;
            }
            out.push(VLQ_ALPHABET[digit as usize] as char);
            if vlq == 0 {
                break;
            }
        }
    }

    fn encode_segment(fields: &[i64], out: &mut String) {
        for &field in fields {
            encode_vlq(field, out);
        }
    }

    /// Inline map with two mappings per line over a single source:
    /// generated (L, 0) -> authored (L*2, 0) and generated (L, 8) ->
    /// authored (L*2, 4), for lines 0 and 1.
    fn inline_map_url() -> String {
        let mut mappings = String::new();
        // Line 0: [0, 0, 0, 0], [8, 0, 0, 4]
        encode_segment(&[0, 0, 0, 0], &mut mappings);
        mappings.push(',');
        encode_segment(&[8, 0, 0, 4], &mut mappings);
        mappings.push(';');
        // Line 1: deltas from previous state.
        encode_segment(&[0, 0, 2, -4], &mut mappings);
        mappings.push(',');
        encode_segment(&[8, 0, 0, 4], &mut mappings);

        let map = serde_json::json!({
            "version": 3,
            "sources": ["src/app.ts"],
            "mappings": mappings,
        });

        format!(
            "data:application/json;base64,{}",
            STANDARD.encode(map.to_string())
        )
    }

    #[test]
    fn test_identity_round_trip() {
        let translator = PositionTranslator::identity();

        let executed = translator.to_executed(12, 7, Some("/a.js"));
        assert_eq!((executed.line, executed.column), (12, 7));
        assert!(!executed.verified);

        let authored = translator.to_authored(executed.line, executed.column);
        assert_eq!((authored.line, authored.column), (12, 7));
    }

    #[test]
    fn test_mapped_translation() {
        let translator = PositionTranslator::from_source_map_url(&inline_map_url());
        assert!(matches!(translator, PositionTranslator::Mapped(_)));

        // Authored (2, 4) was generated at (1, 8).
        let executed = translator.to_executed(2, 4, Some("/project/src/app.ts"));
        assert!(executed.verified);
        assert_eq!((executed.line, executed.column), (1, 8));

        let authored = translator.to_authored(executed.line, executed.column);
        assert!(authored.verified);
        assert_eq!((authored.line, authored.column), (2, 4));
    }

    #[test]
    fn test_mapped_nearest_point() {
        let translator = PositionTranslator::from_source_map_url(&inline_map_url());

        // No exact mapping at authored (1, 0); nearest following mapped
        // point is authored (2, 0) -> generated (1, 0).
        let executed = translator.to_executed(1, 0, None);
        assert!(executed.verified);
        assert_eq!((executed.line, executed.column), (1, 0));

        // Executed position past the last mapping on line 0 resolves to
        // that line's last mapped authored point.
        let authored = translator.to_authored(0, 20);
        assert!(authored.verified);
        assert_eq!((authored.line, authored.column), (0, 4));
    }

    #[test]
    fn test_broken_map_degrades_to_identity() {
        for url in [
            "data:application/json;base64,!!!not-base64!!!",
            "data:application/json;base64,bm90IGpzb24=",
            "https://example.com/external.map",
            "",
        ] {
            let translator = PositionTranslator::from_source_map_url(url);
            assert!(
                matches!(translator, PositionTranslator::Identity),
                "expected identity for {:?}",
                url
            );
        }
    }

    #[test]
    fn test_oversized_vlq_degrades_to_identity() {
        // A segment whose continuation bits never terminate within an
        // i64's width must be rejected, not shifted past 64 bits.
        let map = serde_json::json!({
            "version": 3,
            "sources": ["src/app.ts"],
            "mappings": "ggggggggggggggA",
        });
        let url = format!(
            "data:application/json;base64,{}",
            STANDARD.encode(map.to_string())
        );

        let translator = PositionTranslator::from_source_map_url(&url);
        assert!(matches!(translator, PositionTranslator::Identity));
    }

    #[test]
    fn test_source_selection_by_suffix() {
        let mut mappings = String::new();
        encode_segment(&[0, 0, 0, 0], &mut mappings); // source 0
        mappings.push(',');
        encode_segment(&[4, 1, 0, 0], &mut mappings); // source 1

        let map = serde_json::json!({
            "version": 3,
            "sources": ["src/a.ts", "src/b.ts"],
            "mappings": mappings,
        });
        let url = format!(
            "data:application/json;base64,{}",
            STANDARD.encode(map.to_string())
        );

        let translator = PositionTranslator::from_source_map_url(&url);

        let via_b = translator.to_executed(0, 0, Some("/work/src/b.ts"));
        assert_eq!((via_b.line, via_b.column), (0, 4));

        // Unmatched path falls back to the first source.
        let via_unknown = translator.to_executed(0, 0, Some("/work/other.ts"));
        assert_eq!((via_unknown.line, via_unknown.column), (0, 0));
    }
}
