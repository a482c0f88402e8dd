//! Default values for configuration fields.
//!
//! These functions are used by serde for default deserialization.

pub fn r#false() -> bool {
    false
}

// ============================================================================
// [project] Section Defaults
// ============================================================================

pub mod project {
    pub fn portable() -> bool {
        true
    }
}

// ============================================================================
// [views] Section Defaults
// ============================================================================

pub mod views {
    pub fn pattern() -> String {
        "**/*.tpl".into()
    }

    pub fn exclude() -> Vec<String> {
        vec!["target/**".into(), "node_modules/**".into(), ".git/**".into()]
    }

    pub fn debug_info() -> bool {
        true
    }
}

// ============================================================================
// Publish Target Defaults
// ============================================================================

pub mod target {
    pub fn configuration() -> String {
        "Debug".into()
    }
}
