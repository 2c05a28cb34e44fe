// SPDX-License-Identifier: GPL-3.0-only
//! Shader sources for the GPU compositor
//!
//! The WGSL is embedded at compile time so the binary has no runtime asset
//! lookup.

/// Textured quad with rotation (`mvp`) and sampling (`st`) transforms
///
/// Bindings: 0 frame texture, 1 sampler, 2 `Transforms` uniform.
pub const COMPOSITE_SHADER: &str = include_str!("composite.wgsl");

/// Vertex count of the quad triangle strip
pub const QUAD_VERTEX_COUNT: u32 = 4;

#[cfg(test)]
mod tests {
    use super::*;

    /// Validate that a WGSL shader compiles successfully using naga
    fn validate_shader(name: &str, source: &str) {
        let result = naga::front::wgsl::parse_str(source);
        match result {
            Ok(module) => {
                let info = naga::valid::Validator::new(
                    naga::valid::ValidationFlags::all(),
                    naga::valid::Capabilities::all(),
                )
                .validate(&module);

                if let Err(e) = info {
                    panic!("Shader '{}' validation failed: {:?}", name, e);
                }
            }
            Err(e) => {
                panic!("Shader '{}' parse failed: {:?}", name, e);
            }
        }
    }

    #[test]
    fn test_composite_shader_validates() {
        validate_shader("composite", COMPOSITE_SHADER);
    }

    #[test]
    fn test_composite_entry_points_present() {
        let module = naga::front::wgsl::parse_str(COMPOSITE_SHADER).unwrap();
        let names: Vec<&str> = module.entry_points.iter().map(|e| e.name.as_str()).collect();
        assert!(names.contains(&"vs_main"));
        assert!(names.contains(&"fs_main"));
    }
}
