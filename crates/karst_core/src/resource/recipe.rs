//! # Recipe String Construction
//!
//! Recipes are flat `key=value,key2=value2` parameter strings; `\` escapes
//! the structural characters `\ , = ;`. The manager treats recipes as
//! opaque cache keys - byte-for-byte equal recipes hit the same cache slot,
//! nothing else does - so producers and consumers of a recipe must agree on
//! one spelling. This module builds well-formed recipes; parsing them is
//! the provider's job.

/// Builds the canonical single-parameter recipe for a file-backed resource:
/// `path=<escaped path>`.
#[must_use]
pub fn recipe_from_path(path: &str) -> String {
    let mut recipe = String::with_capacity(path.len() + 5);
    push_param(&mut recipe, "path", path);
    recipe
}

/// Appends `key=value` to `recipe`, comma-separated from any existing
/// parameters, escaping structural characters in both.
pub fn push_param(recipe: &mut String, key: &str, value: &str) {
    if !recipe.is_empty() {
        recipe.push(',');
    }
    push_escaped(recipe, key);
    recipe.push('=');
    push_escaped(recipe, value);
}

fn push_escaped(out: &mut String, text: &str) {
    for c in text.chars() {
        if matches!(c, '\\' | ',' | '=' | ';') {
            out.push('\\');
        }
        out.push(c);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_recipe() {
        assert_eq!(recipe_from_path("textures/rock.png"), "path=textures/rock.png");
    }

    #[test]
    fn test_structural_characters_are_escaped() {
        assert_eq!(
            recipe_from_path(r"odd,name=with;stuff\here"),
            r"path=odd\,name\=with\;stuff\\here"
        );
    }

    #[test]
    fn test_multiple_params() {
        let mut recipe = recipe_from_path("a.png");
        push_param(&mut recipe, "mips", "1");
        assert_eq!(recipe, "path=a.png,mips=1");
    }

    #[test]
    fn test_distinct_paths_make_distinct_keys() {
        assert_ne!(recipe_from_path(r"a,b"), recipe_from_path(r"a\,b"));
    }
}
