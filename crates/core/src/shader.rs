//! Shader programs: compilation, linking, reflection and uniform commits.
//!
//! Compiled stage objects are shared through a [`ShaderCache`] keyed by
//! source, so programs built from the same vertex or fragment source compile
//! it once. A [`Shader`] keeps its [`ShaderDefinition`] so it can relink after
//! a context restore.

use std::collections::HashMap;

use thiserror::Error;

use crate::buffer::VertexSemantic;
use crate::gl::Gl;
use crate::scope::{ScopeId, ScopeSpace, UniformValue, UniformVersion};

/// Errors that can occur during shader compilation or program linking.
#[derive(Debug, Clone, Error)]
pub enum ShaderError {
    /// A shader stage failed to compile.
    #[error("shader '{name}' compile error ({stage}):\n{log}")]
    CompileError {
        name: String,
        /// "vertex" or "fragment".
        stage: &'static str,
        /// Numbered source followed by the driver's info log.
        log: String,
    },
    /// A program failed to link.
    #[error("shader '{name}' link error:\n{log}")]
    LinkError { name: String, log: String },
}

/// Formats a shader compilation error for human-readable debugging.
///
/// Prepends right-aligned line numbers to each line of `source`, then
/// appends the driver's error `log`, so the line numbers the driver
/// reports can be matched against the GLSL.
pub fn format_shader_error(source: &str, log: &str) -> String {
    let source_lines: Vec<&str> = if source.is_empty() {
        Vec::new()
    } else {
        source.lines().collect()
    };

    let line_count = source_lines.len();
    let width = if line_count == 0 {
        1
    } else {
        line_count.to_string().len()
    };

    let numbered: String = source_lines
        .iter()
        .enumerate()
        .map(|(i, line)| format!("{:>width$}: {line}", i + 1, width = width))
        .collect::<Vec<_>>()
        .join("\n");

    match (numbered.is_empty(), log.is_empty()) {
        (true, true) => String::new(),
        (true, false) => log.to_string(),
        (false, true) => numbered,
        (false, false) => format!("{numbered}\n\n{log}"),
    }
}

fn stage_name(shader_type: u32) -> &'static str {
    match shader_type {
        glow::VERTEX_SHADER => "vertex",
        glow::FRAGMENT_SHADER => "fragment",
        _ => "unknown",
    }
}

/// Sources and attribute bindings of a program.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderDefinition {
    pub name: String,
    pub vertex_source: String,
    pub fragment_source: String,
    /// Attribute name in the vertex source, and the semantic whose fixed
    /// location it is bound to.
    pub attributes: Vec<(String, VertexSemantic)>,
}

impl ShaderDefinition {
    pub fn new(name: &str, vertex_source: &str, fragment_source: &str) -> Self {
        Self {
            name: name.to_string(),
            vertex_source: vertex_source.to_string(),
            fragment_source: fragment_source.to_string(),
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, name: &str, semantic: VertexSemantic) -> Self {
        self.attributes.push((name.to_string(), semantic));
        self
    }
}

/// Compiled stage objects shared between programs.
#[derive(Debug)]
pub struct ShaderCache<G: Gl> {
    vertex: HashMap<String, G::Shader>,
    fragment: HashMap<String, G::Shader>,
}

impl<G: Gl> Default for ShaderCache<G> {
    fn default() -> Self {
        Self {
            vertex: HashMap::new(),
            fragment: HashMap::new(),
        }
    }
}

impl<G: Gl> ShaderCache<G> {
    /// Returns the compiled stage for `source`, compiling on a miss. Failed
    /// compiles are not cached.
    ///
    /// # Errors
    ///
    /// Returns `ShaderError::CompileError` with the numbered source and the
    /// driver's info log.
    pub fn compile(
        &mut self,
        gl: &G,
        name: &str,
        shader_type: u32,
        source: &str,
    ) -> Result<G::Shader, ShaderError> {
        let stage = stage_name(shader_type);
        let map = if shader_type == glow::VERTEX_SHADER {
            &mut self.vertex
        } else {
            &mut self.fragment
        };
        if let Some(shader) = map.get(source) {
            return Ok(*shader);
        }

        let shader = gl.create_shader(shader_type).map_err(|log| ShaderError::CompileError {
            name: name.to_string(),
            stage,
            log,
        })?;
        gl.shader_source(shader, source);
        gl.compile_shader(shader);
        if !gl.get_shader_compile_status(shader) {
            let info_log = gl.get_shader_info_log(shader);
            gl.delete_shader(shader);
            return Err(ShaderError::CompileError {
                name: name.to_string(),
                stage,
                log: format_shader_error(source, &info_log),
            });
        }
        map.insert(source.to_string(), shader);
        Ok(shader)
    }

    pub fn len(&self) -> usize {
        self.vertex.len() + self.fragment.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deletes every cached stage object.
    pub fn clear(&mut self, gl: &G) {
        for (_, shader) in self.vertex.drain().chain(self.fragment.drain()) {
            gl.delete_shader(shader);
        }
    }

    /// Forgets every handle without native calls.
    pub(crate) fn on_lost(&mut self) {
        self.vertex.clear();
        self.fragment.clear();
    }
}

fn is_sampler(utype: u32) -> bool {
    matches!(
        utype,
        glow::SAMPLER_2D
            | glow::SAMPLER_CUBE
            | glow::SAMPLER_3D
            | glow::SAMPLER_2D_SHADOW
            | glow::SAMPLER_CUBE_SHADOW
            | glow::SAMPLER_2D_ARRAY
            | glow::SAMPLER_2D_ARRAY_SHADOW
            | glow::INT_SAMPLER_2D
            | glow::INT_SAMPLER_3D
            | glow::INT_SAMPLER_CUBE
            | glow::INT_SAMPLER_2D_ARRAY
            | glow::UNSIGNED_INT_SAMPLER_2D
            | glow::UNSIGNED_INT_SAMPLER_3D
            | glow::UNSIGNED_INT_SAMPLER_CUBE
            | glow::UNSIGNED_INT_SAMPLER_2D_ARRAY
    )
}

/// A reflected non-sampler uniform.
#[derive(Debug)]
pub(crate) struct ShaderUniform<G: Gl> {
    pub(crate) name: String,
    pub(crate) scope: ScopeId,
    pub(crate) location: G::UniformLocation,
    pub(crate) utype: u32,
    /// Version of the scope value last committed.
    pub(crate) version: UniformVersion,
}

/// A reflected sampler uniform.
#[derive(Debug)]
pub(crate) struct ShaderSampler<G: Gl> {
    pub(crate) name: String,
    pub(crate) scope: ScopeId,
    pub(crate) location: G::UniformLocation,
    pub(crate) utype: u32,
    /// Unit last written to a single sampler.
    pub(crate) slot: Option<i32>,
}

/// A linked program owned by a device.
#[derive(Debug)]
pub struct Shader<G: Gl> {
    definition: ShaderDefinition,
    pub(crate) program: Option<G::Program>,
    pub(crate) uniforms: Vec<ShaderUniform<G>>,
    pub(crate) samplers: Vec<ShaderSampler<G>>,
    failed: bool,
}

impl<G: Gl> Shader<G> {
    pub(crate) fn new(definition: ShaderDefinition) -> Self {
        Self {
            definition,
            program: None,
            uniforms: Vec::new(),
            samplers: Vec::new(),
            failed: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &ShaderDefinition {
        &self.definition
    }

    /// Compilation or linking failed; draws with this shader are skipped.
    pub fn failed(&self) -> bool {
        self.failed
    }

    pub fn is_linked(&self) -> bool {
        self.program.is_some()
    }

    pub fn program(&self) -> Option<G::Program> {
        self.program
    }

    /// Names of the reflected non-sampler uniforms.
    pub fn uniform_names(&self) -> Vec<&str> {
        self.uniforms.iter().map(|u| u.name.as_str()).collect()
    }

    /// Names of the reflected samplers.
    pub fn sampler_names(&self) -> Vec<&str> {
        self.samplers.iter().map(|s| s.name.as_str()).collect()
    }

    /// Compiles both stages, links and reflects the program. On failure the
    /// shader is marked failed and holds no program.
    ///
    /// # Errors
    ///
    /// Returns the compile or link error, also logged.
    pub(crate) fn link(
        &mut self,
        gl: &G,
        cache: &mut ShaderCache<G>,
        scope: &mut ScopeSpace,
    ) -> Result<(), ShaderError> {
        let result = self.try_link(gl, cache, scope);
        if let Err(err) = &result {
            log::error!("{err}");
            self.failed = true;
        }
        result
    }

    fn try_link(
        &mut self,
        gl: &G,
        cache: &mut ShaderCache<G>,
        scope: &mut ScopeSpace,
    ) -> Result<(), ShaderError> {
        let def = &self.definition;
        let link_error = |log: String| ShaderError::LinkError {
            name: def.name.clone(),
            log,
        };
        let vertex = cache.compile(gl, &def.name, glow::VERTEX_SHADER, &def.vertex_source)?;
        let fragment = cache.compile(gl, &def.name, glow::FRAGMENT_SHADER, &def.fragment_source)?;

        let program = gl.create_program().map_err(link_error)?;
        gl.attach_shader(program, vertex);
        gl.attach_shader(program, fragment);
        for (attribute, semantic) in &def.attributes {
            gl.bind_attrib_location(program, semantic.location(), attribute);
        }
        gl.link_program(program);

        // The stage objects stay in the cache; the program keeps its own copy.
        gl.detach_shader(program, vertex);
        gl.detach_shader(program, fragment);

        if !gl.get_program_link_status(program) {
            let info_log = gl.get_program_info_log(program);
            gl.delete_program(program);
            return Err(link_error(info_log));
        }

        let mut uniforms = Vec::new();
        let mut samplers = Vec::new();
        for active in gl.get_active_uniforms(program) {
            let Some(location) = gl.get_uniform_location(program, &active.name) else {
                continue;
            };
            let name = active.name.trim_end_matches("[0]").to_string();
            let scope_id = scope.resolve(&name);
            if is_sampler(active.utype) {
                samplers.push(ShaderSampler {
                    name,
                    scope: scope_id,
                    location,
                    utype: active.utype,
                    slot: None,
                });
            } else {
                uniforms.push(ShaderUniform {
                    name,
                    scope: scope_id,
                    location,
                    utype: active.utype,
                    version: UniformVersion::default(),
                });
            }
        }

        self.program = Some(program);
        self.uniforms = uniforms;
        self.samplers = samplers;
        self.failed = false;
        Ok(())
    }

    pub(crate) fn forget_native(&mut self) {
        self.program = None;
        self.uniforms.clear();
        self.samplers.clear();
    }

    /// Deletes the program. Returns it so the caller can forget it.
    pub(crate) fn release(&mut self, gl: &G) -> Option<G::Program> {
        let program = self.program.take();
        if let Some(program) = program {
            gl.delete_program(program);
        }
        self.uniforms.clear();
        self.samplers.clear();
        program
    }
}

/// Components of one element of a float or int uniform of type `utype`.
fn vector_width(utype: u32) -> u32 {
    match utype {
        glow::FLOAT_VEC2 | glow::INT_VEC2 | glow::BOOL_VEC2 => 2,
        glow::FLOAT_VEC3 | glow::INT_VEC3 | glow::BOOL_VEC3 => 3,
        glow::FLOAT_VEC4 | glow::INT_VEC4 | glow::BOOL_VEC4 => 4,
        _ => 1,
    }
}

/// Issues the native call that writes `value` to a uniform of `utype`.
pub(crate) fn commit_uniform<G: Gl>(
    gl: &G,
    location: &G::UniformLocation,
    utype: u32,
    value: &UniformValue,
) {
    match value {
        UniformValue::Float(v) => gl.uniform_f32(location, 1, &[*v]),
        UniformValue::Vec2(v) => gl.uniform_f32(location, 2, &v.to_array()),
        UniformValue::Vec3(v) => gl.uniform_f32(location, 3, &v.to_array()),
        UniformValue::Vec4(v) => gl.uniform_f32(location, 4, &v.to_array()),
        UniformValue::Int(v) => gl.uniform_i32(location, 1, &[*v]),
        UniformValue::IVec2(v) => gl.uniform_i32(location, 2, &v.to_array()),
        UniformValue::IVec3(v) => gl.uniform_i32(location, 3, &v.to_array()),
        UniformValue::IVec4(v) => gl.uniform_i32(location, 4, &v.to_array()),
        UniformValue::Bool(v) => gl.uniform_i32(location, 1, &[i32::from(*v)]),
        UniformValue::Mat3(m) => gl.uniform_matrix_f32(location, 3, &m.to_cols_array()),
        UniformValue::Mat4(m) => gl.uniform_matrix_f32(location, 4, &m.to_cols_array()),
        UniformValue::FloatArray(values) => match utype {
            glow::FLOAT_MAT2 => gl.uniform_matrix_f32(location, 2, values),
            glow::FLOAT_MAT3 => gl.uniform_matrix_f32(location, 3, values),
            glow::FLOAT_MAT4 => gl.uniform_matrix_f32(location, 4, values),
            _ => gl.uniform_f32(location, vector_width(utype), values),
        },
        UniformValue::IntArray(values) => gl.uniform_i32(location, vector_width(utype), values),
        UniformValue::Texture(_) | UniformValue::TextureArray(_) => {
            log::warn!("texture value bound to a non-sampler uniform");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gl::{GlCall, RecordingGl};

    const VS: &str = "attribute vec3 vertex_position;\nuniform mat4 matrix_model;\nvoid main() {}\n";
    const FS: &str = "uniform sampler2D texture_diffuse;\nuniform vec4 tint;\nuniform float weights[4];\nvoid main() {}\n";

    fn definition() -> ShaderDefinition {
        ShaderDefinition::new("basic", VS, FS).with_attribute("vertex_position", VertexSemantic::Position)
    }

    // --- format_shader_error tests ---

    #[test]
    fn format_shader_error_prepends_line_numbers() {
        let source = "#version 300 es\nvoid main() {\n}\n";
        let log = "ERROR: 0:2: syntax error";
        let formatted = format_shader_error(source, log);

        assert!(
            formatted.contains("1: #version 300 es"),
            "expected line 1 with content, got:\n{formatted}"
        );
        assert!(
            formatted.contains("2: void main() {"),
            "expected line 2 with content, got:\n{formatted}"
        );
        assert!(
            formatted.contains(log),
            "expected original log in output, got:\n{formatted}"
        );
    }

    #[test]
    fn format_shader_error_handles_empty_inputs() {
        assert_eq!(format_shader_error("", "some error"), "some error");
        assert_eq!(format_shader_error("void main() {}", ""), "1: void main() {}");
        assert!(format_shader_error("", "").is_empty());
    }

    #[test]
    fn format_shader_error_right_aligns_line_numbers() {
        let source = (1..=12)
            .map(|i| format!("line {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        let formatted = format_shader_error(&source, "err");
        let lines: Vec<&str> = formatted.lines().collect();

        assert!(
            lines[0].starts_with(" 1: "),
            "expected right-aligned single digit, got: '{}'",
            lines[0]
        );
        assert!(
            lines[9].starts_with("10: "),
            "expected no padding for double digit, got: '{}'",
            lines[9]
        );
    }

    // --- ShaderError Display tests ---

    #[test]
    fn compile_error_display_includes_name_stage_and_log() {
        let err = ShaderError::CompileError {
            name: "skybox".into(),
            stage: "fragment",
            log: "undeclared identifier".into(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("skybox"), "missing name in: {msg}");
        assert!(msg.contains("fragment"), "missing stage in: {msg}");
        assert!(msg.contains("undeclared identifier"), "missing log in: {msg}");
    }

    #[test]
    fn link_error_display_includes_log() {
        let err = ShaderError::LinkError {
            name: "basic".into(),
            log: "varying mismatch".into(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("varying mismatch"), "missing log in: {msg}");
    }

    // --- linking against the recording binding ---

    #[test]
    fn link_reflects_uniforms_and_samplers() {
        let gl = RecordingGl::webgl2();
        let mut cache = ShaderCache::default();
        let mut scope = ScopeSpace::new();
        let mut shader: Shader<RecordingGl> = Shader::new(definition());
        shader.link(&gl, &mut cache, &mut scope).unwrap();

        assert!(shader.is_linked());
        assert_eq!(shader.sampler_names(), vec!["texture_diffuse"]);
        let mut uniforms = shader.uniform_names();
        uniforms.sort_unstable();
        assert_eq!(uniforms, vec!["matrix_model", "tint", "weights"], "array suffix is trimmed");
        assert!(scope.find("tint").is_some(), "reflection registers scope entries");
        assert_eq!(
            gl.count(|c| matches!(c, GlCall::BindAttribLocation { index: 0, name, .. } if name == "vertex_position")),
            1
        );
    }

    #[test]
    fn stage_objects_are_shared_between_programs() {
        let gl = RecordingGl::webgl2();
        let mut cache = ShaderCache::default();
        let mut scope = ScopeSpace::new();
        let mut a: Shader<RecordingGl> = Shader::new(definition());
        let mut b: Shader<RecordingGl> = Shader::new(ShaderDefinition::new("other", VS, FS));
        a.link(&gl, &mut cache, &mut scope).unwrap();
        b.link(&gl, &mut cache, &mut scope).unwrap();
        assert_eq!(gl.count(|c| matches!(c, GlCall::CompileShader(_))), 2);
        assert_eq!(cache.len(), 2);
        cache.clear(&gl);
        assert_eq!(gl.count(|c| matches!(c, GlCall::DeleteShader(_))), 2);
    }

    #[test]
    fn compile_failure_marks_shader_failed() {
        let gl = RecordingGl::webgl2();
        let mut cache = ShaderCache::default();
        let mut scope = ScopeSpace::new();
        let mut shader: Shader<RecordingGl> =
            Shader::new(ShaderDefinition::new("broken", VS, "#error nope\nvoid main() {}\n"));
        let err = shader.link(&gl, &mut cache, &mut scope).unwrap_err();
        assert!(matches!(err, ShaderError::CompileError { stage: "fragment", .. }));
        assert!(err.to_string().contains("1: #error nope"), "log carries numbered source: {err}");
        assert!(shader.failed());
        assert!(!shader.is_linked());
        assert_eq!(cache.len(), 1, "only the vertex stage is cached");
    }

    #[test]
    fn float_arrays_commit_by_reflected_type() {
        let gl = RecordingGl::webgl2();
        let location = crate::gl::recording::RecordedLocation {
            program: crate::gl::Handle(1),
            name: "m".into(),
        };
        commit_uniform(&gl, &location, glow::FLOAT_MAT4, &UniformValue::FloatArray(vec![0.0; 32]));
        commit_uniform(&gl, &location, glow::FLOAT_VEC3, &UniformValue::FloatArray(vec![0.0; 6]));
        let calls = gl.calls();
        assert!(matches!(&calls[0], GlCall::UniformMatrix { dim: 4, .. }), "got {calls:?}");
        assert!(matches!(&calls[1], GlCall::UniformF32 { components: 3, .. }), "got {calls:?}");
    }
}
