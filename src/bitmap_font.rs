//! Built-in 8x8 bitmap glyphs used when no TrueType font can be loaded.
//!
//! Printable ASCII and block elements come from font8x8 (public domain,
//! <https://github.com/dhepper/font8x8>). Bit 7 of each row is the leftmost pixel.

/// U+0020 ..= U+007E
const BASIC: [[u8; 8]; 95] = [
    [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00], // U+0020 (space)
    [0x18, 0x3C, 0x3C, 0x18, 0x18, 0x00, 0x18, 0x00], // U+0021 (!)
    [0x6C, 0x6C, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00], // U+0022 (")
    [0x6C, 0x6C, 0xFE, 0x6C, 0xFE, 0x6C, 0x6C, 0x00], // U+0023 (#)
    [0x30, 0x7C, 0xC0, 0x78, 0x0C, 0xF8, 0x30, 0x00], // U+0024 ($)
    [0x00, 0xC6, 0xCC, 0x18, 0x30, 0x66, 0xC6, 0x00], // U+0025 (%)
    [0x38, 0x6C, 0x38, 0x76, 0xDC, 0xCC, 0x76, 0x00], // U+0026 (&)
    [0x60, 0x60, 0xC0, 0x00, 0x00, 0x00, 0x00, 0x00], // U+0027 (')
    [0x18, 0x30, 0x60, 0x60, 0x60, 0x30, 0x18, 0x00], // U+0028 (()
    [0x60, 0x30, 0x18, 0x18, 0x18, 0x30, 0x60, 0x00], // U+0029 ())
    [0x00, 0x66, 0x3C, 0xFF, 0x3C, 0x66, 0x00, 0x00], // U+002A (*)
    [0x00, 0x30, 0x30, 0xFC, 0x30, 0x30, 0x00, 0x00], // U+002B (+)
    [0x00, 0x00, 0x00, 0x00, 0x00, 0x30, 0x30, 0x60], // U+002C (,)
    [0x00, 0x00, 0x00, 0xFC, 0x00, 0x00, 0x00, 0x00], // U+002D (-)
    [0x00, 0x00, 0x00, 0x00, 0x00, 0x30, 0x30, 0x00], // U+002E (.)
    [0x06, 0x0C, 0x18, 0x30, 0x60, 0xC0, 0x80, 0x00], // U+002F (/)
    [0x7C, 0xC6, 0xCE, 0xDE, 0xF6, 0xE6, 0x7C, 0x00], // U+0030 (0)
    [0x30, 0x70, 0x30, 0x30, 0x30, 0x30, 0xFC, 0x00], // U+0031 (1)
    [0x78, 0xCC, 0x0C, 0x38, 0x60, 0xCC, 0xFC, 0x00], // U+0032 (2)
    [0x78, 0xCC, 0x0C, 0x38, 0x0C, 0xCC, 0x78, 0x00], // U+0033 (3)
    [0x1C, 0x3C, 0x6C, 0xCC, 0xFE, 0x0C, 0x1E, 0x00], // U+0034 (4)
    [0xFC, 0xC0, 0xF8, 0x0C, 0x0C, 0xCC, 0x78, 0x00], // U+0035 (5)
    [0x38, 0x60, 0xC0, 0xF8, 0xCC, 0xCC, 0x78, 0x00], // U+0036 (6)
    [0xFC, 0xCC, 0x0C, 0x18, 0x30, 0x30, 0x30, 0x00], // U+0037 (7)
    [0x78, 0xCC, 0xCC, 0x78, 0xCC, 0xCC, 0x78, 0x00], // U+0038 (8)
    [0x78, 0xCC, 0xCC, 0x7C, 0x0C, 0x18, 0x70, 0x00], // U+0039 (9)
    [0x00, 0x30, 0x30, 0x00, 0x00, 0x30, 0x30, 0x00], // U+003A (:)
    [0x00, 0x30, 0x30, 0x00, 0x00, 0x30, 0x30, 0x60], // U+003B (;)
    [0x18, 0x30, 0x60, 0xC0, 0x60, 0x30, 0x18, 0x00], // U+003C (<)
    [0x00, 0x00, 0xFC, 0x00, 0x00, 0xFC, 0x00, 0x00], // U+003D (=)
    [0x60, 0x30, 0x18, 0x0C, 0x18, 0x30, 0x60, 0x00], // U+003E (>)
    [0x78, 0xCC, 0x0C, 0x18, 0x30, 0x00, 0x30, 0x00], // U+003F (?)
    [0x7C, 0xC6, 0x8C, 0x18, 0x32, 0x66, 0xFE, 0x00], // U+0040 (@)
    [0x30, 0x78, 0xCC, 0xCC, 0xFC, 0xCC, 0xCC, 0x00], // U+0041 (A)
    [0xFC, 0x66, 0x66, 0x7C, 0x66, 0x66, 0xFC, 0x00], // U+0042 (B)
    [0x3C, 0x66, 0xC0, 0xC0, 0xC0, 0x66, 0x3C, 0x00], // U+0043 (C)
    [0xF8, 0x6C, 0x66, 0x66, 0x66, 0x6C, 0xF8, 0x00], // U+0044 (D)
    [0xFE, 0x62, 0x68, 0x78, 0x68, 0x62, 0xFE, 0x00], // U+0045 (E)
    [0xFE, 0x62, 0x68, 0x78, 0x68, 0x60, 0xF0, 0x00], // U+0046 (F)
    [0x3C, 0x66, 0xC0, 0xC0, 0xCE, 0x66, 0x3E, 0x00], // U+0047 (G)
    [0xCC, 0xCC, 0xCC, 0xFC, 0xCC, 0xCC, 0xCC, 0x00], // U+0048 (H)
    [0x78, 0x30, 0x30, 0x30, 0x30, 0x30, 0x78, 0x00], // U+0049 (I)
    [0x1E, 0x0C, 0x0C, 0x0C, 0xCC, 0xCC, 0x78, 0x00], // U+004A (J)
    [0xE6, 0x66, 0x6C, 0x78, 0x6C, 0x66, 0xE6, 0x00], // U+004B (K)
    [0xF0, 0x60, 0x60, 0x60, 0x62, 0x66, 0xFE, 0x00], // U+004C (L)
    [0xC6, 0xEE, 0xFE, 0xFE, 0xD6, 0xC6, 0xC6, 0x00], // U+004D (M)
    [0xC6, 0xE6, 0xF6, 0xDE, 0xCE, 0xC6, 0xC6, 0x00], // U+004E (N)
    [0x38, 0x6C, 0xC6, 0xC6, 0xC6, 0x6C, 0x38, 0x00], // U+004F (O)
    [0xFC, 0x66, 0x66, 0x7C, 0x60, 0x60, 0xF0, 0x00], // U+0050 (P)
    [0x78, 0xCC, 0xCC, 0xCC, 0xDC, 0x78, 0x1C, 0x00], // U+0051 (Q)
    [0xFC, 0x66, 0x66, 0x7C, 0x6C, 0x66, 0xE6, 0x00], // U+0052 (R)
    [0x78, 0xCC, 0xE0, 0x70, 0x1C, 0xCC, 0x78, 0x00], // U+0053 (S)
    [0xFC, 0xB4, 0x30, 0x30, 0x30, 0x30, 0x78, 0x00], // U+0054 (T)
    [0xCC, 0xCC, 0xCC, 0xCC, 0xCC, 0xCC, 0xFC, 0x00], // U+0055 (U)
    [0xCC, 0xCC, 0xCC, 0xCC, 0xCC, 0x78, 0x30, 0x00], // U+0056 (V)
    [0xC6, 0xC6, 0xC6, 0xD6, 0xFE, 0xEE, 0xC6, 0x00], // U+0057 (W)
    [0xC6, 0xC6, 0x6C, 0x38, 0x38, 0x6C, 0xC6, 0x00], // U+0058 (X)
    [0xCC, 0xCC, 0xCC, 0x78, 0x30, 0x30, 0x78, 0x00], // U+0059 (Y)
    [0xFE, 0xC6, 0x8C, 0x18, 0x32, 0x66, 0xFE, 0x00], // U+005A (Z)
    [0x78, 0x60, 0x60, 0x60, 0x60, 0x60, 0x78, 0x00], // U+005B ([)
    [0xC0, 0x60, 0x30, 0x18, 0x0C, 0x06, 0x02, 0x00], // U+005C (\)
    [0x78, 0x18, 0x18, 0x18, 0x18, 0x18, 0x78, 0x00], // U+005D (])
    [0x10, 0x38, 0x6C, 0xC6, 0x00, 0x00, 0x00, 0x00], // U+005E (^)
    [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xFF], // U+005F (_)
    [0x30, 0x30, 0x18, 0x00, 0x00, 0x00, 0x00, 0x00], // U+0060 (`)
    [0x00, 0x00, 0x78, 0x0C, 0x7C, 0xCC, 0x76, 0x00], // U+0061 (a)
    [0xE0, 0x60, 0x60, 0x7C, 0x66, 0x66, 0xDC, 0x00], // U+0062 (b)
    [0x00, 0x00, 0x78, 0xCC, 0xC0, 0xCC, 0x78, 0x00], // U+0063 (c)
    [0x1C, 0x0C, 0x0C, 0x7C, 0xCC, 0xCC, 0x76, 0x00], // U+0064 (d)
    [0x00, 0x00, 0x78, 0xCC, 0xFC, 0xC0, 0x78, 0x00], // U+0065 (e)
    [0x38, 0x6C, 0x60, 0xF0, 0x60, 0x60, 0xF0, 0x00], // U+0066 (f)
    [0x00, 0x00, 0x76, 0xCC, 0xCC, 0x7C, 0x0C, 0xF8], // U+0067 (g)
    [0xE0, 0x60, 0x6C, 0x76, 0x66, 0x66, 0xE6, 0x00], // U+0068 (h)
    [0x30, 0x00, 0x70, 0x30, 0x30, 0x30, 0x78, 0x00], // U+0069 (i)
    [0x0C, 0x00, 0x0C, 0x0C, 0x0C, 0xCC, 0xCC, 0x78], // U+006A (j)
    [0xE0, 0x60, 0x66, 0x6C, 0x78, 0x6C, 0xE6, 0x00], // U+006B (k)
    [0x70, 0x30, 0x30, 0x30, 0x30, 0x30, 0x78, 0x00], // U+006C (l)
    [0x00, 0x00, 0xCC, 0xFE, 0xFE, 0xD6, 0xC6, 0x00], // U+006D (m)
    [0x00, 0x00, 0xF8, 0xCC, 0xCC, 0xCC, 0xCC, 0x00], // U+006E (n)
    [0x00, 0x00, 0x78, 0xCC, 0xCC, 0xCC, 0x78, 0x00], // U+006F (o)
    [0x00, 0x00, 0xDC, 0x66, 0x66, 0x7C, 0x60, 0xF0], // U+0070 (p)
    [0x00, 0x00, 0x76, 0xCC, 0xCC, 0x7C, 0x0C, 0x1E], // U+0071 (q)
    [0x00, 0x00, 0xDC, 0x76, 0x66, 0x60, 0xF0, 0x00], // U+0072 (r)
    [0x00, 0x00, 0x7C, 0xC0, 0x78, 0x0C, 0xF8, 0x00], // U+0073 (s)
    [0x10, 0x30, 0x7C, 0x30, 0x30, 0x34, 0x18, 0x00], // U+0074 (t)
    [0x00, 0x00, 0xCC, 0xCC, 0xCC, 0xCC, 0x76, 0x00], // U+0075 (u)
    [0x00, 0x00, 0xCC, 0xCC, 0xCC, 0x78, 0x30, 0x00], // U+0076 (v)
    [0x00, 0x00, 0xC6, 0xD6, 0xFE, 0xFE, 0x6C, 0x00], // U+0077 (w)
    [0x00, 0x00, 0xC6, 0x6C, 0x38, 0x6C, 0xC6, 0x00], // U+0078 (x)
    [0x00, 0x00, 0xCC, 0xCC, 0xCC, 0x7C, 0x0C, 0xF8], // U+0079 (y)
    [0x00, 0x00, 0xFC, 0x98, 0x30, 0x64, 0xFC, 0x00], // U+007A (z)
    [0x1C, 0x30, 0x30, 0xE0, 0x30, 0x30, 0x1C, 0x00], // U+007B ({)
    [0x18, 0x18, 0x18, 0x00, 0x18, 0x18, 0x18, 0x00], // U+007C (|)
    [0xE0, 0x30, 0x30, 0x1C, 0x30, 0x30, 0xE0, 0x00], // U+007D (})
    [0x76, 0xDC, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00], // U+007E (~)
];

/// U+2580 ..= U+259F, stored least-significant-bit first.
const BLOCK: [[u8; 8]; 32] = [
    [0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00], // U+2580 (top half)
    [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xFF], // U+2581 (box 1/8)
    [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xFF, 0xFF], // U+2582 (box 2/8)
    [0x00, 0x00, 0x00, 0x00, 0x00, 0xFF, 0xFF, 0xFF], // U+2583 (box 3/8)
    [0x00, 0x00, 0x00, 0x00, 0xFF, 0xFF, 0xFF, 0xFF], // U+2584 (bottom half)
    [0x00, 0x00, 0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF], // U+2585 (box 5/8)
    [0x00, 0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF], // U+2586 (box 6/8)
    [0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF], // U+2587 (box 7/8)
    [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF], // U+2588 (solid)
    [0x7F, 0x7F, 0x7F, 0x7F, 0x7F, 0x7F, 0x7F, 0x7F], // U+2589 (box 7/8)
    [0x3F, 0x3F, 0x3F, 0x3F, 0x3F, 0x3F, 0x3F, 0x3F], // U+258A (box 6/8)
    [0x1F, 0x1F, 0x1F, 0x1F, 0x1F, 0x1F, 0x1F, 0x1F], // U+258B (box 5/8)
    [0x0F, 0x0F, 0x0F, 0x0F, 0x0F, 0x0F, 0x0F, 0x0F], // U+258C (left half)
    [0x07, 0x07, 0x07, 0x07, 0x07, 0x07, 0x07, 0x07], // U+258D (box 3/8)
    [0x03, 0x03, 0x03, 0x03, 0x03, 0x03, 0x03, 0x03], // U+258E (box 2/8)
    [0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01], // U+258F (box 1/8)
    [0xF0, 0xF0, 0xF0, 0xF0, 0xF0, 0xF0, 0xF0, 0xF0], // U+2590 (right half)
    [0x55, 0x00, 0xAA, 0x00, 0x55, 0x00, 0xAA, 0x00], // U+2591 (25% solid)
    [0x55, 0xAA, 0x55, 0xAA, 0x55, 0xAA, 0x55, 0xAA], // U+2592 (50% solid)
    [0xFF, 0xAA, 0xFF, 0x55, 0xFF, 0xAA, 0xFF, 0x55], // U+2593 (75% solid)
    [0xFF, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00], // U+2594 (box 1/8)
    [0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80], // U+2595 (box 1/8)
    [0x00, 0x00, 0x00, 0x00, 0x0F, 0x0F, 0x0F, 0x0F], // U+2596 (box bottom left)
    [0x00, 0x00, 0x00, 0x00, 0xF0, 0xF0, 0xF0, 0xF0], // U+2597 (box bottom right)
    [0x0F, 0x0F, 0x0F, 0x0F, 0x00, 0x00, 0x00, 0x00], // U+2598 (box top left)
    [0x0F, 0x0F, 0x0F, 0x0F, 0xFF, 0xFF, 0xFF, 0xFF], // U+2599 (boxes left and bottom)
    [0x0F, 0x0F, 0x0F, 0x0F, 0xF0, 0xF0, 0xF0, 0xF0], // U+259A (boxes top-left and bottom right)
    [0xFF, 0xFF, 0xFF, 0xFF, 0x0F, 0x0F, 0x0F, 0x0F], // U+259B (boxes top and left)
    [0xFF, 0xFF, 0xFF, 0xFF, 0xF0, 0xF0, 0xF0, 0xF0], // U+259C (boxes top and right)
    [0xF0, 0xF0, 0xF0, 0xF0, 0x00, 0x00, 0x00, 0x00], // U+259D (box top right)
    [0xF0, 0xF0, 0xF0, 0xF0, 0x0F, 0x0F, 0x0F, 0x0F], // U+259E (boxes top right and bottom left)
    [0xF0, 0xF0, 0xF0, 0xF0, 0xFF, 0xFF, 0xFF, 0xFF], // U+259F (boxes right and bottom)
];

/// Glyphs used by the dotted and line ramps that font8x8 does not cover.
const EXTRA: [(char, [u8; 8]); 9] = [
    ('·', [0x00, 0x00, 0x00, 0x18, 0x18, 0x00, 0x00, 0x00]),
    ('∙', [0x00, 0x00, 0x00, 0x18, 0x18, 0x00, 0x00, 0x00]),
    ('∘', [0x00, 0x00, 0x3C, 0x24, 0x24, 0x3C, 0x00, 0x00]),
    ('○', [0x3C, 0x42, 0x81, 0x81, 0x81, 0x81, 0x42, 0x3C]),
    ('◎', [0x3C, 0x42, 0x99, 0xA5, 0xA5, 0x99, 0x42, 0x3C]),
    ('●', [0x3C, 0x7E, 0xFF, 0xFF, 0xFF, 0xFF, 0x7E, 0x3C]),
    ('─', [0x00, 0x00, 0x00, 0xFF, 0x00, 0x00, 0x00, 0x00]),
    ('┉', [0x00, 0x00, 0x00, 0x33, 0x33, 0x00, 0x00, 0x00]),
    ('┊', [0x08, 0x08, 0x00, 0x08, 0x08, 0x00, 0x08, 0x08]),
];

const UNKNOWN: [u8; 8] = [0x7E, 0x81, 0xA5, 0x81, 0xBD, 0x99, 0x81, 0x7E];

/// 8x8 pattern for `ch`; unsupported characters get a placeholder box.
pub fn pattern(ch: char) -> [u8; 8] {
    let code = ch as u32;
    match code {
        0x20..=0x7E => BASIC[(code - 0x20) as usize],
        0x2580..=0x259F => BLOCK[(code - 0x2580) as usize].map(u8::reverse_bits),
        _ if ch.is_whitespace() => [0; 8],
        _ => EXTRA
            .iter()
            .find(|(c, _)| *c == ch)
            .map_or(UNKNOWN, |(_, p)| *p),
    }
}

/// Whether pixel `(x, y)` of the 8x8 cell is set.
#[inline]
pub fn bit(pattern: &[u8; 8], x: u32, y: u32) -> bool {
    x < 8 && y < 8 && (pattern[y as usize] >> (7 - x)) & 1 == 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn space_is_blank_and_full_block_is_solid() {
        assert_eq!(pattern(' '), [0; 8]);
        assert_eq!(pattern('█'), [0xFF; 8]);
    }

    #[test]
    fn every_ramp_glyph_has_a_pattern() {
        for style in crate::ramp::Style::ALL {
            for &g in style.ramp().glyphs() {
                if g != ' ' {
                    assert_ne!(pattern(g), UNKNOWN, "{style} glyph {g:?} missing");
                    assert_ne!(pattern(g), [0; 8], "{style} glyph {g:?} blank");
                }
            }
        }
    }

    #[test]
    fn letters_have_distinct_shapes() {
        let letters: Vec<char> = ('A'..='Z').chain('a'..='z').collect();
        for (i, &a) in letters.iter().enumerate() {
            for &b in &letters[i + 1..] {
                assert_ne!(pattern(a), pattern(b), "{a} and {b} share a pattern");
            }
        }
        // Crossbars.
        assert_eq!(pattern('H')[3], 0xFC);
        assert_eq!(pattern('A')[4], 0xFC);
    }

    #[test]
    fn msb_is_leftmost() {
        // Left half block.
        let p = pattern('▌');
        assert!(bit(&p, 0, 0));
        assert!(!bit(&p, 7, 0));
    }
}
