//! Static technology signature tables.
//!
//! A technology matches a body of text when any of its patterns occurs in it
//! as a case-sensitive substring. Tables are scanned in declaration order.

/// One technology and the substrings that reveal it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub name: &'static str,
    pub patterns: &'static [&'static str],
}

/// Which table applies to a piece of content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentScope {
    /// Script and document bodies.
    Script,
    Stylesheet,
}

impl ContentScope {
    pub fn table(self) -> &'static [Signature] {
        match self {
            ContentScope::Script => SCRIPT_SIGNATURES,
            ContentScope::Stylesheet => STYLESHEET_SIGNATURES,
        }
    }
}

/// Signatures matched against script and document content.
pub const SCRIPT_SIGNATURES: &[Signature] = &[
    Signature {
        name: "React",
        patterns: &["react", "React", "createElement"],
    },
    Signature {
        name: "Angular",
        patterns: &["angular", "ng-", "Angular"],
    },
    Signature {
        name: "Vue.js",
        patterns: &["vue", "Vue", "createApp"],
    },
    Signature {
        name: "Next.js",
        patterns: &["next", "Next", "__NEXT_DATA__"],
    },
    Signature {
        name: "Nuxt.js",
        patterns: &["nuxt", "Nuxt"],
    },
    Signature {
        name: "jQuery",
        patterns: &["jQuery", "$()."],
    },
    Signature {
        name: "Bootstrap JS",
        patterns: &["bootstrap", "Bootstrap"],
    },
    Signature {
        name: "Tailwind CSS",
        patterns: &["tailwind", "tailwindcss"],
    },
    Signature {
        name: "Webpack",
        patterns: &["webpack", "Webpack"],
    },
    Signature {
        name: "Vite",
        patterns: &["__vite__", "vite/client"],
    },
];

/// Signatures matched against stylesheet content.
pub const STYLESHEET_SIGNATURES: &[Signature] = &[
    Signature {
        name: "Bootstrap",
        patterns: &[".container", ".row", ".col-", "bootstrap"],
    },
    Signature {
        name: "Tailwind CSS",
        patterns: &["tailwind", "@tailwind"],
    },
    Signature {
        name: "Bulma",
        patterns: &["bulma", "section", "hero"],
    },
    Signature {
        name: "Foundation",
        patterns: &["foundation", "row", "column"],
    },
    Signature {
        name: "Materialize",
        patterns: &["materialize", "card-panel"],
    },
    Signature {
        name: "Font Awesome",
        patterns: &["fontawesome", "fa-"],
    },
];
