//! TeX math to plain Unicode, good enough for a terminal cell grid.

/// Groups and commands nested deeper than this are copied through as source text.
const MAX_NESTING: usize = 64;

pub fn latex_to_unicode(source: &str) -> String {
    let mut parser = MathParser {
        chars: source.chars().collect(),
        pos: 0,
        depth: 0,
    };
    let raw = parser.parse_seq(None);
    collapse_spaces(&raw)
}

struct MathParser {
    chars: Vec<char>,
    pos: usize,
    depth: usize,
}

impl MathParser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += 1;
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn nested(&mut self, parse: impl FnOnce(&mut Self) -> String) -> String {
        if self.depth >= MAX_NESTING {
            return self.take_rest();
        }
        self.depth += 1;
        let out = parse(self);
        self.depth -= 1;
        out
    }

    fn take_rest(&mut self) -> String {
        let rest = self.chars[self.pos..].iter().collect();
        self.pos = self.chars.len();
        rest
    }

    fn parse_seq(&mut self, close: Option<char>) -> String {
        let mut out = String::new();
        while let Some(ch) = self.peek() {
            if Some(ch) == close {
                self.pos += 1;
                break;
            }
            match ch {
                '{' => {
                    self.pos += 1;
                    out.push_str(&self.nested(|p| p.parse_seq(Some('}'))));
                }
                // unbalanced
                '}' => self.pos += 1,
                '^' => {
                    self.pos += 1;
                    let arg = self.parse_arg();
                    out.push_str(&superscript(&arg));
                }
                '_' => {
                    self.pos += 1;
                    let arg = self.parse_arg();
                    out.push_str(&subscript(&arg));
                }
                '\\' => out.push_str(&self.parse_command()),
                '&' | '~' => {
                    self.pos += 1;
                    out.push(' ');
                }
                c if c.is_whitespace() => {
                    self.pos += 1;
                    out.push(' ');
                }
                c => {
                    self.pos += 1;
                    out.push(c);
                }
            }
        }
        out
    }

    fn parse_arg(&mut self) -> String {
        self.nested(Self::parse_arg_inner)
    }

    fn parse_arg_inner(&mut self) -> String {
        self.skip_whitespace();
        match self.peek() {
            Some('{') => {
                self.pos += 1;
                self.parse_seq(Some('}'))
            }
            Some('\\') => self.parse_command(),
            Some(_) => self.bump().map(String::from).unwrap_or_default(),
            None => String::new(),
        }
    }

    fn parse_command(&mut self) -> String {
        // leading backslash
        self.pos += 1;
        let mut name = String::new();
        while let Some(ch) = self.peek() {
            if !ch.is_ascii_alphabetic() {
                break;
            }
            name.push(ch);
            self.pos += 1;
        }
        if name.is_empty() {
            return match self.bump() {
                Some(',' | ';' | ':' | ' ') => " ".to_string(),
                Some('!') | None => String::new(),
                Some('\\') => "; ".to_string(),
                Some(other) => other.to_string(),
            };
        }

        match name.as_str() {
            "frac" | "dfrac" | "tfrac" | "cfrac" => {
                let numerator = self.parse_arg();
                let denominator = self.parse_arg();
                format!("{}/{}", group(&numerator), group(&denominator))
            }
            "sqrt" => {
                self.skip_whitespace();
                let index = if self.peek() == Some('[') {
                    self.pos += 1;
                    let mut index = String::new();
                    while let Some(ch) = self.bump() {
                        if ch == ']' {
                            break;
                        }
                        index.push(ch);
                    }
                    Some(index)
                } else {
                    None
                };
                let radicand = self.parse_arg();
                let root = match index.as_deref().map(str::trim) {
                    Some("3") => "∛".to_string(),
                    Some("4") => "∜".to_string(),
                    Some(n) if !n.is_empty() => format!("{}√", superscript(n)),
                    _ => "√".to_string(),
                };
                format!("{root}{}", group(&radicand))
            }
            "text" | "textrm" | "textbf" | "textit" | "mathrm" | "mathbf" | "mathit"
            | "mathsf" | "mathbb" | "operatorname" | "boldsymbol" => self.parse_arg(),
            "left" | "right" | "big" | "Big" | "bigl" | "bigr" | "Bigl" | "Bigr" => {
                self.skip_whitespace();
                match self.peek() {
                    Some('\\') => self.nested(Self::parse_command),
                    Some('.') => {
                        self.pos += 1;
                        String::new()
                    }
                    Some(_) => self.bump().map(String::from).unwrap_or_default(),
                    None => String::new(),
                }
            }
            "begin" | "end" => {
                self.parse_arg();
                String::new()
            }
            "quad" => "  ".to_string(),
            "qquad" => "    ".to_string(),
            other => symbol(other)
                .map(str::to_string)
                .unwrap_or_else(|| other.to_string()),
        }
    }
}

fn group(text: &str) -> String {
    let text = text.trim();
    let simple = text
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == ',');
    if simple && !text.is_empty() {
        text.to_string()
    } else {
        format!("({text})")
    }
}

fn symbol(name: &str) -> Option<&'static str> {
    let out = match name {
        "alpha" => "α",
        "beta" => "β",
        "gamma" => "γ",
        "delta" => "δ",
        "epsilon" | "varepsilon" => "ε",
        "zeta" => "ζ",
        "eta" => "η",
        "theta" | "vartheta" => "θ",
        "iota" => "ι",
        "kappa" => "κ",
        "lambda" => "λ",
        "mu" => "μ",
        "nu" => "ν",
        "xi" => "ξ",
        "pi" => "π",
        "rho" => "ρ",
        "sigma" => "σ",
        "tau" => "τ",
        "upsilon" => "υ",
        "phi" | "varphi" => "φ",
        "chi" => "χ",
        "psi" => "ψ",
        "omega" => "ω",
        "Gamma" => "Γ",
        "Delta" => "Δ",
        "Theta" => "Θ",
        "Lambda" => "Λ",
        "Xi" => "Ξ",
        "Pi" => "Π",
        "Sigma" => "Σ",
        "Phi" => "Φ",
        "Psi" => "Ψ",
        "Omega" => "Ω",
        "cdot" => "·",
        "times" => "×",
        "div" => "÷",
        "pm" => "±",
        "mp" => "∓",
        "le" | "leq" => "≤",
        "ge" | "geq" => "≥",
        "ne" | "neq" => "≠",
        "approx" => "≈",
        "equiv" => "≡",
        "sim" => "∼",
        "propto" => "∝",
        "infty" => "∞",
        "sum" => "∑",
        "prod" => "∏",
        "int" => "∫",
        "oint" => "∮",
        "partial" => "∂",
        "nabla" => "∇",
        "to" | "rightarrow" => "→",
        "leftarrow" => "←",
        "Rightarrow" | "implies" => "⇒",
        "Leftarrow" => "⇐",
        "Leftrightarrow" | "iff" => "⇔",
        "mapsto" => "↦",
        "in" => "∈",
        "notin" => "∉",
        "subset" => "⊂",
        "subseteq" => "⊆",
        "supset" => "⊃",
        "cup" => "∪",
        "cap" => "∩",
        "setminus" => "∖",
        "forall" => "∀",
        "exists" => "∃",
        "neg" | "lnot" => "¬",
        "land" | "wedge" => "∧",
        "lor" | "vee" => "∨",
        "emptyset" | "varnothing" => "∅",
        "angle" => "∠",
        "perp" => "⊥",
        "parallel" => "∥",
        "circ" => "∘",
        "degree" => "°",
        "ldots" | "dots" => "…",
        "cdots" => "⋯",
        "prime" => "′",
        "mid" => "|",
        "lvert" | "rvert" | "vert" => "|",
        "langle" => "⟨",
        "rangle" => "⟩",
        "lfloor" => "⌊",
        "rfloor" => "⌋",
        "lceil" => "⌈",
        "rceil" => "⌉",
        "therefore" => "∴",
        "because" => "∵",
        _ => return None,
    };
    Some(out)
}

fn superscript(text: &str) -> String {
    let text = text.trim();
    let mapped: Option<String> = text.chars().map(superscript_char).collect();
    match mapped {
        Some(mapped) if !mapped.is_empty() => mapped,
        _ if text.chars().count() == 1 => format!("^{text}"),
        _ => format!("^({text})"),
    }
}

fn subscript(text: &str) -> String {
    let text = text.trim();
    let mapped: Option<String> = text.chars().map(subscript_char).collect();
    match mapped {
        Some(mapped) if !mapped.is_empty() => mapped,
        _ if text.chars().count() == 1 => format!("_{text}"),
        _ => format!("_({text})"),
    }
}

fn superscript_char(ch: char) -> Option<char> {
    let out = match ch {
        '0' => '⁰',
        '1' => '¹',
        '2' => '²',
        '3' => '³',
        '4' => '⁴',
        '5' => '⁵',
        '6' => '⁶',
        '7' => '⁷',
        '8' => '⁸',
        '9' => '⁹',
        '+' => '⁺',
        '-' | '−' => '⁻',
        '=' => '⁼',
        '(' => '⁽',
        ')' => '⁾',
        'n' => 'ⁿ',
        'i' => 'ⁱ',
        'x' => 'ˣ',
        'y' => 'ʸ',
        'T' => 'ᵀ',
        '′' => '′',
        _ => return None,
    };
    Some(out)
}

fn subscript_char(ch: char) -> Option<char> {
    let out = match ch {
        '0' => '₀',
        '1' => '₁',
        '2' => '₂',
        '3' => '₃',
        '4' => '₄',
        '5' => '₅',
        '6' => '₆',
        '7' => '₇',
        '8' => '₈',
        '9' => '₉',
        '+' => '₊',
        '-' | '−' => '₋',
        '=' => '₌',
        '(' => '₍',
        ')' => '₎',
        'a' => 'ₐ',
        'e' => 'ₑ',
        'o' => 'ₒ',
        'x' => 'ₓ',
        'i' => 'ᵢ',
        'j' => 'ⱼ',
        'k' => 'ₖ',
        'm' => 'ₘ',
        'n' => 'ₙ',
        't' => 'ₜ',
        _ => return None,
    };
    Some(out)
}

fn collapse_spaces(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_space = false;
    for ch in text.chars() {
        if ch == ' ' {
            if !last_space {
                out.push(ch);
            }
            last_space = true;
        } else {
            out.push(ch);
            last_space = false;
        }
    }
    out.trim().to_string()
}
