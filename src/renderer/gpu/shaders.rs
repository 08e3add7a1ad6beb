// renderer/gpu/shaders.rs
//
// WGSL for the built-in programs. Every program shares one bind group:
// binding 0 is the uniform block, 1 the sampler, 2.. the textures.

use super::program::{ProgramDescriptor, UNIFORM_SLOTS};
use crate::renderer::batch::{quad_layout, BatchHandlerTileSprite, BatchHandlerTriFlat};
use crate::renderer::filters::{filter_layout, BlurQuality};
use crate::renderer::gpu_layer::SubmitterImageGpuLayer;
use std::fmt::Write;

/// Most lights the lit quad program can address in its uniform block.
pub const MAX_SHADER_LIGHTS: usize = (UNIFORM_SLOTS - 6) / 4;

fn header(textures: u32) -> String {
    let mut src = format!(
        "struct Uniforms {{ slots: array<vec4<f32>, {UNIFORM_SLOTS}>, }};\n\
         @group(0) @binding(0) var<uniform> u: Uniforms;\n\
         @group(0) @binding(1) var samp: sampler;\n"
    );
    for i in 0..textures {
        let _ = writeln!(src, "@group(0) @binding({}) var t{}: texture_2d<f32>;", i + 2, i);
    }
    src.push_str(
        "fn to_clip(p: vec2<f32>) -> vec4<f32> {\n\
         \x20   let res = u.slots[0].yz;\n\
         \x20   return vec4<f32>(p.x / res.x * 2.0 - 1.0, 1.0 - p.y / res.y * 2.0, 0.0, 1.0);\n\
         }\n",
    );
    src
}

const TINT: &str = r#"
fn tinted(texel: vec4<f32>, tint: vec4<f32>, effect: f32) -> vec4<f32> {
    let multiplied = vec4<f32>(texel.rgb * tint.rgb * tint.a, texel.a * tint.a);
    let filled = vec4<f32>(tint.rgb * texel.a * tint.a, texel.a * tint.a);
    return mix(multiplied, filled, effect);
}
"#;

const QUAD_VERTEX: &str = r#"
struct VsOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) uv: vec2<f32>,
    @location(1) @interpolate(flat) tex_id: f32,
    @location(2) effect: f32,
    @location(3) tint: vec4<f32>,
};

@vertex
fn vs_main(
    @location(0) in_position: vec2<f32>,
    @location(1) in_tex_coord: vec2<f32>,
    @location(2) in_tex_id: f32,
    @location(3) in_tint_effect: f32,
    @location(4) in_tint: vec4<f32>,
) -> VsOut {
    var p = in_position;
    if (u.slots[1].x > 0.5) {
        p = round(p);
    }
    var out: VsOut;
    out.pos = to_clip(p);
    out.uv = in_tex_coord;
    out.tex_id = in_tex_id;
    out.effect = in_tint_effect;
    out.tint = in_tint;
    return out;
}
"#;

// Smooth pixel art keeps texels crisp but antialiases the seams between
// them; `fw` must come from uniform control flow.
const SAMPLE_TEXTURE: &str = r#"
fn smooth_uv(size: vec2<f32>, uv: vec2<f32>, fw: vec2<f32>) -> vec2<f32> {
    let texel = uv * size;
    let seam = floor(texel + 0.5);
    let span = max(fw * size, vec2<f32>(0.0001));
    return (seam + clamp((texel - seam) / span, vec2<f32>(-0.5), vec2<f32>(0.5))) / size;
}

fn sample_texture(t: texture_2d<f32>, uv: vec2<f32>, fw: vec2<f32>) -> vec4<f32> {
    var st = uv;
    if ((u32(u.slots[0].x) & 2u) != 0u) {
        st = smooth_uv(vec2<f32>(textureDimensions(t)), uv, fw);
    }
    return textureSampleLevel(t, samp, st, 0.0);
}
"#;

/// `sample_unit(unit, uv, fw)` over `units` bound textures.
fn sample_unit_source(units: u32) -> String {
    let mut src = String::from(SAMPLE_TEXTURE);
    src.push_str("fn sample_unit(unit: i32, uv: vec2<f32>, fw: vec2<f32>) -> vec4<f32> {\n");
    for i in 0..units - 1 {
        let _ = writeln!(
            src,
            "    if (unit == {i}) {{ return sample_texture(t{i}, uv, fw); }}"
        );
    }
    let _ = writeln!(src, "    return sample_texture(t{}, uv, fw);\n}}", units - 1);
    src
}

fn quad_source(units: u32) -> String {
    let units = units.max(1);
    let mut src = header(units);
    src.push_str(TINT);
    src.push_str(QUAD_VERTEX);
    src.push_str(&sample_unit_source(units));
    src.push_str(
        r#"
@fragment
fn fs_main(v: VsOut) -> @location(0) vec4<f32> {
    let fw = fwidth(v.uv);
    let texel = sample_unit(i32(v.tex_id + 0.5), v.uv, fw);
    return tinted(texel, v.tint, v.effect);
}
"#,
    );
    src
}

fn quad_light_source() -> String {
    let mut src = header(2);
    src.push_str(TINT);
    src.push_str(QUAD_VERTEX);
    let _ = write!(
        src,
        r#"
@fragment
fn fs_main(v: VsOut) -> @location(0) vec4<f32> {{
    let texel = textureSampleLevel(t0, samp, v.uv, 0.0);
    let n = textureSampleLevel(t1, samp, v.uv, 0.0).rgb * 2.0 - 1.0;
    let rot = u.slots[3];
    let normal = normalize(vec3<f32>(rot.x * n.x + rot.y * n.y, rot.z * n.x + rot.w * n.y, n.z));
    let res = u.slots[0].yz;
    let frag = vec2<f32>(v.pos.x, res.y - v.pos.y);
    var light = u.slots[4].rgb;
    let count = min(i32(u.slots[5].x), {max_lights});
    for (var i = 0; i < count; i = i + 1) {{
        let base = 6 + i * 4;
        let lp = u.slots[base].xyz;
        let radius = max(u.slots[base + 3].x, 0.0001);
        let d = vec3<f32>(lp.xy - frag, lp.z);
        let diffuse = max(dot(normal, normalize(d)), 0.0);
        let falloff = clamp(1.0 - length(d.xy) / radius, 0.0, 1.0);
        light = light + u.slots[base + 1].rgb * u.slots[base + 2].x * diffuse * falloff;
    }}
    return tinted(vec4<f32>(texel.rgb * light, texel.a), v.tint, v.effect);
}}
"#,
        max_lights = MAX_SHADER_LIGHTS
    );
    src
}

fn tile_sprite_source(units: u32) -> String {
    let units = units.max(1);
    let mut src = header(units);
    src.push_str(TINT);
    src.push_str(&sample_unit_source(units));
    src.push_str(
        r#"
struct VsOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) uv: vec2<f32>,
    @location(1) frame: vec4<f32>,
    @location(2) @interpolate(flat) tex_id: f32,
    @location(3) effect: f32,
    @location(4) tint: vec4<f32>,
};

@vertex
fn vs_main(
    @location(0) in_position: vec2<f32>,
    @location(1) in_tex_coord: vec2<f32>,
    @location(2) in_frame: vec4<f32>,
    @location(3) in_tex_datum: f32,
    @location(4) in_tint_effect: f32,
    @location(5) in_tint: vec4<f32>,
) -> VsOut {
    var out: VsOut;
    out.pos = to_clip(in_position);
    out.uv = in_tex_coord;
    out.frame = in_frame;
    out.tex_id = in_tex_datum;
    out.effect = in_tint_effect;
    out.tint = in_tint;
    return out;
}

@fragment
fn fs_main(v: VsOut) -> @location(0) vec4<f32> {
    let fw = fwidth(v.uv) * abs(v.frame.zw);
    let options = u32(u.slots[0].x);
    var t = v.uv;
    if ((options & 4u) != 0u) {
        t = fract(t);
    } else if ((options & 8u) != 0u) {
        t = clamp(t, vec2<f32>(0.0), vec2<f32>(1.0));
    }
    let texel = sample_unit(i32(v.tex_id + 0.5), v.frame.xy + t * v.frame.zw, fw);
    return tinted(texel, v.tint, v.effect);
}
"#,
    );
    src
}

fn tri_flat_source() -> String {
    let mut src = header(0);
    src.push_str(
        r#"
struct VsOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) tint: vec4<f32>,
};

@vertex
fn vs_main(@location(0) in_position: vec2<f32>, @location(1) in_tint: vec4<f32>) -> VsOut {
    var out: VsOut;
    out.pos = to_clip(in_position);
    out.tint = in_tint;
    return out;
}

@fragment
fn fs_main(v: VsOut) -> @location(0) vec4<f32> {
    return vec4<f32>(v.tint.rgb * v.tint.a, v.tint.a);
}
"#,
    );
    src
}

fn image_gpu_layer_source() -> String {
    let mut src = header(1);
    src.push_str(TINT);
    src.push_str(
        r#"
struct VsOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) uv: vec2<f32>,
    @location(1) effect: f32,
    @location(2) tint: vec4<f32>,
};

@vertex
fn vs_main(
    @location(0) in_vertex: f32,
    @location(1) in_position: vec2<f32>,
    @location(2) in_rotation: f32,
    @location(3) in_scale: vec2<f32>,
    @location(4) in_origin: vec2<f32>,
    @location(5) in_scroll_factor: vec2<f32>,
    @location(6) in_frame_uvs: vec4<f32>,
    @location(7) in_size: vec2<f32>,
    @location(8) in_tint_fill: f32,
    @location(9) in_tint_tl: vec4<f32>,
    @location(10) in_tint_bl: vec4<f32>,
    @location(11) in_tint_tr: vec4<f32>,
    @location(12) in_tint_br: vec4<f32>,
    @location(13) in_alpha: f32,
) -> VsOut {
    // corners TL, BL, TR, BR
    let corner = u32(in_vertex + 0.5);
    let unit = vec2<f32>(f32(corner / 2u), f32(corner % 2u));
    let local = (unit - in_origin) * in_size * in_scale;
    let c = cos(in_rotation);
    let s = sin(in_rotation);
    let world = in_position + vec2<f32>(local.x * c - local.y * s, local.x * s + local.y * c);

    let view = u.slots[1];
    let scrolled = world - u.slots[3].xy * in_scroll_factor;
    var p = vec2<f32>(
        view.x * scrolled.x + view.z * scrolled.y,
        view.y * scrolled.x + view.w * scrolled.y,
    ) + u.slots[2].xy;
    if (u.slots[4].x > 0.5) {
        p = round(p);
    }

    var tint = in_tint_tl;
    if (corner == 1u) {
        tint = in_tint_bl;
    } else if (corner == 2u) {
        tint = in_tint_tr;
    } else if (corner == 3u) {
        tint = in_tint_br;
    }

    var out: VsOut;
    out.pos = to_clip(p);
    out.uv = mix(in_frame_uvs.xy, in_frame_uvs.zw, unit);
    out.effect = in_tint_fill;
    out.tint = vec4<f32>(tint.rgb, tint.a * in_alpha * u.slots[3].z);
    return out;
}

@fragment
fn fs_main(v: VsOut) -> @location(0) vec4<f32> {
    let texel = textureSampleLevel(t0, samp, v.uv, 0.0);
    return tinted(texel, v.tint, v.effect);
}
"#,
    );
    src
}

const FILTER_COMMON: &str = r#"
struct FsIn {
    @builtin(position) pos: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@location(0) in_position: vec2<f32>, @location(1) in_tex_coord: vec2<f32>) -> FsIn {
    var out: FsIn;
    out.pos = vec4<f32>(in_position, 0.0, 1.0);
    out.uv = in_tex_coord;
    return out;
}

fn sample_input(uv: vec2<f32>) -> vec4<f32> {
    let texel = textureSampleLevel(t0, samp, uv, 0.0);
    let inside = all(uv >= vec2<f32>(0.0)) && all(uv <= vec2<f32>(1.0));
    return select(vec4<f32>(0.0), texel, inside);
}
"#;

fn filter_source(textures: u32, fragment: &str) -> String {
    let mut src = header(textures);
    src.push_str(FILTER_COMMON);
    src.push_str(fragment);
    src
}

fn blur_fragment(radius: i32) -> String {
    let sigma = radius as f32 / 2.0 + 0.5;
    format!(
        r#"
@fragment
fn fs_main(v: FsIn) -> @location(0) vec4<f32> {{
    var sum = vec4<f32>(0.0);
    var total = 0.0;
    for (var i = -{radius}; i <= {radius}; i = i + 1) {{
        let w = exp(-f32(i * i) / (2.0 * {sigma:.3} * {sigma:.3}));
        sum = sum + sample_input(v.uv + u.slots[2].xy * f32(i)) * w;
        total = total + w;
    }}
    return sum / total;
}}
"#
    )
}

const COPY_FRAGMENT: &str = r#"
@fragment
fn fs_main(v: FsIn) -> @location(0) vec4<f32> {
    return sample_input(v.uv);
}
"#;

const COLOR_MATRIX_FRAGMENT: &str = r#"
fn m(k: i32) -> f32 {
    return u.slots[2 + k / 4][k % 4];
}

@fragment
fn fs_main(v: FsIn) -> @location(0) vec4<f32> {
    let c = sample_input(v.uv);
    var col = c;
    if (c.a > 0.0) {
        col = vec4<f32>(c.rgb / c.a, c.a);
    }
    var out: vec4<f32>;
    for (var r = 0; r < 4; r = r + 1) {
        let b = r * 5;
        out[r] = m(b) * col.r + m(b + 1) * col.g + m(b + 2) * col.b + m(b + 3) * col.a + m(b + 4);
    }
    let mixed = clamp(mix(col, out, u.slots[7].x), vec4<f32>(0.0), vec4<f32>(1.0));
    return vec4<f32>(mixed.rgb * mixed.a, mixed.a);
}
"#;

const THRESHOLD_FRAGMENT: &str = r#"
@fragment
fn fs_main(v: FsIn) -> @location(0) vec4<f32> {
    var r = smoothstep(u.slots[2], u.slots[3], sample_input(v.uv));
    if (u.slots[4].x > 0.5) {
        r = vec4<f32>(1.0) - r;
    }
    return vec4<f32>(r.rgb * r.a, r.a);
}
"#;

const GLOW_FRAGMENT: &str = r#"
@fragment
fn fs_main(v: FsIn) -> @location(0) vec4<f32> {
    let c = sample_input(v.uv);
    let texel = 1.0 / u.slots[1].xy;
    let reach = u.slots[3].x * u.slots[5].x;
    var total = 0.0;
    for (var a = 0; a < 8; a = a + 1) {
        let angle = f32(a) * 0.7853982;
        let dir = vec2<f32>(cos(angle), sin(angle));
        for (var s = 1; s <= 4; s = s + 1) {
            total = total + sample_input(v.uv + dir * texel * reach * f32(s) / 4.0).a;
        }
    }
    let around = total / 32.0;
    let outer = around * (1.0 - c.a);
    let inner = (1.0 - around) * u.slots[4].x * c.a;
    let glow = vec4<f32>(u.slots[2].rgb * (outer + inner), outer + inner);
    if (u.slots[0].x > 0.5) {
        return glow;
    }
    return c + glow * (1.0 - c.a);
}
"#;

const SHADOW_FRAGMENT: &str = r#"
@fragment
fn fs_main(v: FsIn) -> @location(0) vec4<f32> {
    let c = sample_input(v.uv);
    let n = max(i32(u.slots[6].x), 1);
    var a = 0.0;
    var weight = 1.0;
    for (var i = 1; i <= n; i = i + 1) {
        let t = f32(i) / f32(n);
        a = a + sample_input(v.uv - u.slots[2].xy * t).a * weight;
        weight = weight * (1.0 - u.slots[3].x);
    }
    a = clamp(pow(a / f32(n), u.slots[4].x) * u.slots[7].x, 0.0, 1.0);
    let shadow = vec4<f32>(u.slots[5].rgb * a, a);
    return c + shadow * (1.0 - c.a);
}
"#;

const DISPLACEMENT_FRAGMENT: &str = r#"
@fragment
fn fs_main(v: FsIn) -> @location(0) vec4<f32> {
    let d = textureSampleLevel(t1, samp, v.uv, 0.0).rg * 2.0 - 1.0;
    return sample_input(v.uv + d * u.slots[2].xy);
}
"#;

const MASK_FRAGMENT: &str = r#"
@fragment
fn fs_main(v: FsIn) -> @location(0) vec4<f32> {
    let m = textureSampleLevel(t1, samp, v.uv, 0.0).a;
    let k = select(m, 1.0 - m, u.slots[2].x > 0.5);
    return sample_input(v.uv) * k;
}
"#;

const BLEND_FRAGMENT: &str = r#"
@fragment
fn fs_main(v: FsIn) -> @location(0) vec4<f32> {
    let base = sample_input(v.uv);
    let top = textureSampleLevel(t1, samp, v.uv, 0.0) * u.slots[4];
    var rgb = top.rgb + base.rgb * (1.0 - top.a);
    var alpha = top.a + base.a * (1.0 - top.a);
    switch i32(u.slots[2].x) {
        case 1: {
            rgb = base.rgb + top.rgb;
        }
        case 2: {
            rgb = base.rgb * top.rgb + top.rgb * (1.0 - base.a) + base.rgb * (1.0 - top.a);
        }
        case 3: {
            rgb = base.rgb + top.rgb - base.rgb * top.rgb;
        }
        case 4: {
            rgb = base.rgb * (1.0 - top.a);
            alpha = base.a * (1.0 - top.a);
        }
        case 5: {
            rgb = top.rgb;
            alpha = top.a;
        }
        default: {}
    }
    return mix(base, clamp(vec4<f32>(rgb, alpha), vec4<f32>(0.0), vec4<f32>(1.0)), u.slots[3].x);
}
"#;

/// Fills the scissored area with a solid color.
pub const CLEAR_SOURCE: &str = r#"
struct Uniforms { color: vec4<f32>, };
@group(0) @binding(0) var<uniform> u: Uniforms;

@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> @builtin(position) vec4<f32> {
    let x = f32((index << 1u) & 2u) * 2.0 - 1.0;
    let y = f32(index & 2u) * 2.0 - 1.0;
    return vec4<f32>(x, y, 0.0, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return u.color;
}
"#;

/// Descriptors for every program the built-in nodes draw with.
pub fn builtin_programs(texture_units: u32) -> Vec<ProgramDescriptor> {
    let mut programs = vec![
        ProgramDescriptor::new("quad", quad_source(texture_units), quad_layout())
            .with_uniform("uRoundPixels", 1)
            .with_uniform("uResolution", 1)
            .with_textures(texture_units.max(1)),
        ProgramDescriptor::new(
            "tile_sprite",
            tile_sprite_source(texture_units),
            BatchHandlerTileSprite::layout(),
        )
        .with_textures(texture_units.max(1)),
        ProgramDescriptor::new("tri_flat", tri_flat_source(), BatchHandlerTriFlat::layout()),
        ProgramDescriptor::new(
            SubmitterImageGpuLayer::PROGRAM.name,
            image_gpu_layer_source(),
            SubmitterImageGpuLayer::vertex_layout(),
        )
        .with_instances(SubmitterImageGpuLayer::instance_layout())
        .with_uniform("uViewMatrix", 2)
        .with_uniform("uCameraScrollAndAlpha", 1)
        .with_uniform("uRoundPixels", 1)
        .with_textures(1),
    ];

    let mut lit = ProgramDescriptor::new("quad_light", quad_light_source(), quad_layout())
        .with_uniform("uCamera", 1)
        .with_uniform("uResolution", 1)
        .with_uniform("uInverseRotationMatrix", 1)
        .with_uniform("uAmbientLightColor", 1)
        .with_uniform("uLightCount", 1)
        .with_textures(2);
    for i in 0..MAX_SHADER_LIGHTS {
        lit = lit
            .with_uniform(format!("uLights[{i}].position"), 1)
            .with_uniform(format!("uLights[{i}].color"), 1)
            .with_uniform(format!("uLights[{i}].intensity"), 1)
            .with_uniform(format!("uLights[{i}].radius"), 1);
    }
    programs.push(lit);

    let filter = |name: &'static str, textures: u32, fragment: &str| {
        ProgramDescriptor::new(name, filter_source(textures, fragment), filter_layout())
            .with_uniform("uResolution", 1)
            .with_textures(textures)
    };

    programs.push(filter("filter_copy", 1, COPY_FRAGMENT));
    for (name, quality) in [
        ("filter_blur_low", BlurQuality::Low),
        ("filter_blur_med", BlurQuality::Medium),
        ("filter_blur_high", BlurQuality::High),
    ] {
        let radius = quality.kernel_radius() as i32;
        programs.push(
            filter(name, 1, &blur_fragment(radius))
                .with_uniform("uOffset", 1)
                .with_uniform("uStrength", 1),
        );
    }
    programs.push(
        filter("filter_color_matrix", 1, COLOR_MATRIX_FRAGMENT)
            .with_uniform("uColorMatrix", 5)
            .with_uniform("uAlpha", 1),
    );
    programs.push(
        filter("filter_threshold", 1, THRESHOLD_FRAGMENT)
            .with_uniform("uEdge1", 1)
            .with_uniform("uEdge2", 1)
            .with_uniform("uInvert", 1),
    );
    programs.push(
        filter("filter_glow", 1, GLOW_FRAGMENT)
            .with_uniform("uColor", 1)
            .with_uniform("uOuterStrength", 1)
            .with_uniform("uInnerStrength", 1)
            .with_uniform("uScale", 1),
    );
    programs.push(
        filter("filter_shadow", 1, SHADOW_FRAGMENT)
            .with_uniform("uOffset", 1)
            .with_uniform("uDecay", 1)
            .with_uniform("uPower", 1)
            .with_uniform("uColor", 1)
            .with_uniform("uSamples", 1)
            .with_uniform("uIntensity", 1),
    );
    programs.push(filter("filter_displacement", 2, DISPLACEMENT_FRAGMENT).with_uniform("uAmount", 1));
    programs.push(filter("filter_mask", 2, MASK_FRAGMENT).with_uniform("uInvert", 1));
    programs.push(
        filter("filter_blend", 2, BLEND_FRAGMENT)
            .with_uniform("uBlendMode", 1)
            .with_uniform("uAmount", 1)
            .with_uniform("uColor", 1),
    );
    programs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::batch::RenderOptions;

    #[test]
    fn quad_source_samples_every_unit() {
        let src = quad_source(4);
        assert!(src.contains("var t3: texture_2d<f32>"));
        assert!(src.contains("return sample_texture(t3, uv, fw);"));
        assert!(!src.contains("t4"));
    }

    #[test]
    fn tile_sprites_select_their_unit() {
        let src = tile_sprite_source(3);
        assert!(src.contains("var t2: texture_2d<f32>"));
        assert!(src.contains("if (unit == 1) { return sample_texture(t1, uv, fw); }"));
        assert!(src.contains("sample_unit(i32(v.tex_id + 0.5)"));

        let programs = builtin_programs(3);
        let tile = programs
            .iter()
            .find(|p| p.name == "tile_sprite")
            .expect("tile sprite program");
        assert_eq!(tile.texture_slots, 3);
    }

    #[test]
    fn smooth_pixel_art_is_a_variant_bit() {
        assert_eq!(RenderOptions::SMOOTH_PIXEL_ART.bits(), 2);
        for src in [quad_source(2), tile_sprite_source(2)] {
            assert!(src.contains("(u32(u.slots[0].x) & 2u) != 0u"));
            assert!(src.contains("let fw = fwidth(v.uv)"));
        }
    }

    #[test]
    fn gpu_layer_instances_follow_the_corner_slot() {
        let programs = builtin_programs(4);
        let layer = programs
            .iter()
            .find(|p| p.name == "image_gpu_layer")
            .expect("gpu layer program");
        let instances = layer.instance_layout.as_ref().expect("instance layout");

        let first = layer.layout.location_count();
        assert_eq!(first, 1);
        let attrs = instances.wgpu_attributes_from(first).expect("formats");
        assert_eq!(attrs.last().map(|a| a.shader_location), Some(13));
        assert!(layer.source.contains("@location(13) in_alpha: f32"));
        assert_eq!(layer.slot_of("uCameraScrollAndAlpha"), Some(3));
        assert_eq!(layer.slot_of("uRoundPixels"), Some(4));
    }

    #[test]
    fn lit_uniforms_match_shader_slots() {
        let programs = builtin_programs(8);
        let lit = programs
            .iter()
            .find(|p| p.name == "quad_light")
            .expect("lit program");
        assert_eq!(lit.slot_of("uInverseRotationMatrix"), Some(3));
        assert_eq!(lit.slot_of("uLightCount"), Some(5));
        assert_eq!(lit.slot_of("uLights[1].position"), Some(10));
        assert_eq!(lit.slot_of("uLights[1].radius"), Some(13));
    }

    #[test]
    fn filter_uniforms_match_shader_slots() {
        let programs = builtin_programs(8);
        let find = |name| programs.iter().find(|p| p.name == name).expect(name);
        assert_eq!(find("filter_color_matrix").slot_of("uAlpha"), Some(7));
        assert_eq!(find("filter_shadow").slot_of("uIntensity"), Some(7));
        assert_eq!(find("filter_blend").slot_of("uColor"), Some(4));
        assert_eq!(find("filter_blur_med").slot_of("uOffset"), Some(2));
    }
}
