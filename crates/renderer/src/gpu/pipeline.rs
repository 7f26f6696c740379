use glow::HasContext;

use crate::compile::{WrappedShader, POSITION_ATTRIBUTE, POSITION_LOCATION};
use crate::dialect::Dialect;
use crate::error::{CompileError, RenderError, ShaderStage};

/// Full-screen quad as a four-vertex triangle strip in clip space.
const QUAD_VERTICES: [[f32; 2]; 4] = [[-1.0, -1.0], [1.0, -1.0], [-1.0, 1.0], [1.0, 1.0]];

/// Names attached to compile failures.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CompileLabel<'a> {
    pub operation: &'static str,
    pub shader: &'a str,
    pub dialect: Dialect,
}

impl CompileLabel<'_> {
    fn error(&self, stage: ShaderStage, log: String) -> CompileError {
        CompileError {
            stage,
            log,
            operation: self.operation,
            shader: self.shader.to_string(),
            dialect: self.dialect,
        }
    }
}

/// A linked GL program. Shader objects are detached and deleted after linking.
#[derive(Debug)]
pub(crate) struct ShaderProgram {
    pub program: glow::Program,
}

impl ShaderProgram {
    /// Compiles and links `wrapped`; every intermediate object is deleted on failure.
    ///
    /// # Safety
    /// `gl` must belong to the context current on this thread.
    pub unsafe fn build(
        gl: &glow::Context,
        wrapped: &WrappedShader,
        label: CompileLabel<'_>,
    ) -> Result<Self, RenderError> {
        let vertex = compile_stage(gl, glow::VERTEX_SHADER, &wrapped.vertex, ShaderStage::Vertex, label)?;
        let fragment = match compile_stage(
            gl,
            glow::FRAGMENT_SHADER,
            &wrapped.fragment,
            ShaderStage::Fragment,
            label,
        ) {
            Ok(fragment) => fragment,
            Err(error) => {
                gl.delete_shader(vertex);
                return Err(error);
            }
        };

        let program = match gl.create_program() {
            Ok(program) => program,
            Err(message) => {
                gl.delete_shader(vertex);
                gl.delete_shader(fragment);
                return Err(RenderError::gl("create_program", message));
            }
        };
        gl.attach_shader(program, vertex);
        gl.attach_shader(program, fragment);
        gl.bind_attrib_location(program, POSITION_LOCATION, POSITION_ATTRIBUTE);
        gl.link_program(program);
        let linked = gl.get_program_link_status(program);
        let log = if linked {
            String::new()
        } else {
            gl.get_program_info_log(program)
        };

        gl.detach_shader(program, vertex);
        gl.detach_shader(program, fragment);
        gl.delete_shader(vertex);
        gl.delete_shader(fragment);

        if !linked {
            gl.delete_program(program);
            return Err(label.error(ShaderStage::Link, log).into());
        }
        Ok(Self { program })
    }

    /// # Safety
    /// `gl` must belong to the context current on this thread.
    pub unsafe fn delete(self, gl: &glow::Context) {
        gl.delete_program(self.program);
    }
}

unsafe fn compile_stage(
    gl: &glow::Context,
    kind: u32,
    source: &str,
    stage: ShaderStage,
    label: CompileLabel<'_>,
) -> Result<glow::Shader, RenderError> {
    let shader = gl
        .create_shader(kind)
        .map_err(|message| RenderError::gl("create_shader", message))?;
    gl.shader_source(shader, source);
    gl.compile_shader(shader);
    if gl.get_shader_compile_status(shader) {
        return Ok(shader);
    }
    let log = gl.get_shader_info_log(shader);
    gl.delete_shader(shader);
    tracing::debug!(%stage, shader = label.shader, "shader stage failed to compile");
    Err(label.error(stage, log).into())
}

/// Vertex buffer (and VAO where the dialect has them) for the quad.
#[derive(Debug)]
pub(crate) struct QuadGeometry {
    buffer: glow::Buffer,
    vertex_array: Option<glow::VertexArray>,
}

impl QuadGeometry {
    /// # Safety
    /// `gl` must belong to the context current on this thread.
    pub unsafe fn new(gl: &glow::Context, dialect: Dialect) -> Result<Self, RenderError> {
        let vertex_array = if dialect.uses_vertex_arrays() {
            let vao = gl
                .create_vertex_array()
                .map_err(|message| RenderError::gl("create_vertex_array", message))?;
            gl.bind_vertex_array(Some(vao));
            Some(vao)
        } else {
            None
        };

        let buffer = match gl.create_buffer() {
            Ok(buffer) => buffer,
            Err(message) => {
                if let Some(vao) = vertex_array {
                    gl.delete_vertex_array(vao);
                }
                return Err(RenderError::gl("create_buffer", message));
            }
        };
        gl.bind_buffer(glow::ARRAY_BUFFER, Some(buffer));
        gl.buffer_data_u8_slice(
            glow::ARRAY_BUFFER,
            bytemuck::cast_slice(&QUAD_VERTICES),
            glow::STATIC_DRAW,
        );
        let geometry = Self {
            buffer,
            vertex_array,
        };
        geometry.configure_attributes(gl);
        if vertex_array.is_some() {
            gl.bind_vertex_array(None);
        }
        gl.bind_buffer(glow::ARRAY_BUFFER, None);
        Ok(geometry)
    }

    unsafe fn configure_attributes(&self, gl: &glow::Context) {
        gl.enable_vertex_attrib_array(POSITION_LOCATION);
        gl.vertex_attrib_pointer_f32(POSITION_LOCATION, 2, glow::FLOAT, false, 0, 0);
    }

    /// # Safety
    /// `gl` must belong to the context current on this thread.
    pub unsafe fn draw(&self, gl: &glow::Context) {
        match self.vertex_array {
            Some(vao) => gl.bind_vertex_array(Some(vao)),
            None => {
                gl.bind_buffer(glow::ARRAY_BUFFER, Some(self.buffer));
                self.configure_attributes(gl);
            }
        }
        gl.draw_arrays(glow::TRIANGLE_STRIP, 0, QUAD_VERTICES.len() as i32);
        match self.vertex_array {
            Some(_) => gl.bind_vertex_array(None),
            None => gl.bind_buffer(glow::ARRAY_BUFFER, None),
        }
    }

    /// # Safety
    /// `gl` must belong to the context current on this thread.
    pub unsafe fn delete(self, gl: &glow::Context) {
        if let Some(vao) = self.vertex_array {
            gl.delete_vertex_array(vao);
        }
        gl.delete_buffer(self.buffer);
    }
}
