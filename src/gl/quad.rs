//! Shared full-viewport quad geometry.
//!
//! ES2-style: one interleaved VBO, attribute pointers rebound per draw,
//! no vertex array objects.

use glow::HasContext;

use crate::error::GpuError;

/// Interleaved x, y, s, t. Triangle strip, texture origin at top-left so
/// camera images come out upright.
#[rustfmt::skip]
const VERTICES: [f32; 16] = [
    -1.0, -1.0, 0.0, 1.0,
     1.0, -1.0, 1.0, 1.0,
    -1.0,  1.0, 0.0, 0.0,
     1.0,  1.0, 1.0, 0.0,
];

const STRIDE: i32 = 4 * 4;

pub struct Quad {
    vbo: glow::NativeBuffer,
}

impl Quad {
    pub unsafe fn create(gl: &glow::Context) -> Result<Self, GpuError> {
        let vbo = gl
            .create_buffer()
            .map_err(|e| GpuError::Create(format!("quad vbo: {e}")))?;
        gl.bind_buffer(glow::ARRAY_BUFFER, Some(vbo));
        gl.buffer_data_u8_slice(glow::ARRAY_BUFFER, float_bytes(&VERTICES), glow::STATIC_DRAW);
        gl.bind_buffer(glow::ARRAY_BUFFER, None);
        Ok(Self { vbo })
    }

    /// Draw the quad with the given attribute locations. Missing
    /// locations skip their attribute.
    pub unsafe fn draw(&self, gl: &glow::Context, position: Option<u32>, tex_coord: Option<u32>) {
        gl.bind_buffer(glow::ARRAY_BUFFER, Some(self.vbo));
        if let Some(pos) = position {
            gl.enable_vertex_attrib_array(pos);
            gl.vertex_attrib_pointer_f32(pos, 2, glow::FLOAT, false, STRIDE, 0);
        }
        if let Some(tex) = tex_coord {
            gl.enable_vertex_attrib_array(tex);
            gl.vertex_attrib_pointer_f32(tex, 2, glow::FLOAT, false, STRIDE, 8);
        }

        gl.draw_arrays(glow::TRIANGLE_STRIP, 0, 4);

        if let Some(pos) = position {
            gl.disable_vertex_attrib_array(pos);
        }
        if let Some(tex) = tex_coord {
            gl.disable_vertex_attrib_array(tex);
        }
        gl.bind_buffer(glow::ARRAY_BUFFER, None);
    }

    pub unsafe fn destroy(&self, gl: &glow::Context) {
        gl.delete_buffer(self.vbo);
    }
}

fn float_bytes(floats: &[f32]) -> &[u8] {
    // f32 has no invalid bit patterns; plain reinterpretation.
    unsafe {
        std::slice::from_raw_parts(floats.as_ptr() as *const u8, std::mem::size_of_val(floats))
    }
}
