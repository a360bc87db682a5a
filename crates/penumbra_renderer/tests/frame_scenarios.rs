use approx::assert_relative_eq;
use glam::Vec3;
use penumbra_core::{Camera, RenderMode};
use penumbra_renderer::{
    DrawCall, PassKind, PassTarget, ProgramKind, Scene, SceneSettings, StencilPolicy,
    commands::MeshKind,
    render_pass::TargetKind,
};

fn camera() -> Camera {
    let mut camera = Camera::default();
    camera.set_projection(45.0, 800.0 / 600.0, 0.1, 1000.1);
    camera.set_transformation(Vec3::new(-3.0, 3.0, -5.0), Vec3::ZERO, Vec3::Y);
    camera
}

fn scene(cubes: usize, points: usize, spots: usize) -> Scene {
    let mut scene = Scene::new(SceneSettings::default());
    scene.init(cubes, points, spots);
    scene.set_viewport(800, 600);
    scene.update(0.0);
    scene
}

fn draw_calls(scene: &Scene) -> Vec<DrawCall> {
    scene.commands().draw_calls().copied().collect()
}

#[test]
fn default_frame_leaves_color_writes_on() {
    let mut scene = scene(10, 2, 1);
    scene.draw(&camera(), &RenderMode::default(), true);

    let commands = scene.commands();
    assert!(!commands.passes().is_empty());
    assert!(commands.tracker().current().color_write);
}

#[test]
fn nothing_writes_scene_depth_after_the_prime() {
    let mut volumes = scene(10, 2, 1);
    volumes.draw(&camera(), &RenderMode::default(), true);
    let mut maps = scene(10, 2, 1);
    maps.draw_shadow_mapped(&camera(), &RenderMode::default());

    for scene in [&volumes, &maps] {
        let steps = scene.commands().tracker().steps();
        assert_eq!(steps[0].pass, PassKind::DepthPrime);
        assert!(steps[0].state.depth_write);

        for step in &steps[1..] {
            if step.target == TargetKind::Scene {
                assert!(!step.state.depth_write, "{:?} writes depth", step.pass);
            }
        }
    }
}

#[test]
fn ambient_over_point_lights_sums_to_base() {
    let base = SceneSettings::default().base_ambient;

    for lights in 1..=5 {
        let mut scene = scene(10, lights, 1);
        let total: f32 = scene.point_lights().iter().map(|light| light.color.w).sum();
        assert_relative_eq!(total, base, epsilon = 1e-8);

        // What the ambient cube draws actually upload
        scene.draw(&camera(), &RenderMode::default(), true);
        let commands = scene.commands();
        let uploaded: f32 = commands
            .passes()
            .iter()
            .filter(|pass| pass.label.starts_with("Point Light"))
            .flat_map(|pass| &pass.draws)
            .filter(|draw| draw.pass.has_ambient() && draw.mesh == MeshKind::Cube)
            .map(|draw| commands.draw_uniforms()[draw.draw_slot as usize].light_color[3])
            .sum();
        assert_relative_eq!(uploaded, base, epsilon = 1e-8);
    }
}

#[test]
fn spot_lights_keep_aiming_at_the_origin() {
    let mut scene = scene(10, 2, 3);

    for _ in 0..20 {
        scene.update(0.37);
        for light in scene.spot_lights() {
            let expected = (-light.position).normalize();
            assert_relative_eq!(light.direction.length(), 1.0, epsilon = 1e-5);
            assert_relative_eq!(light.direction.x, expected.x, epsilon = 1e-5);
            assert_relative_eq!(light.direction.y, expected.y, epsilon = 1e-5);
            assert_relative_eq!(light.direction.z, expected.z, epsilon = 1e-5);
        }
    }
}

#[test]
fn carmack_toggle_only_swaps_stencil_policy() {
    let mut scene = scene(10, 2, 1);

    scene.draw(&camera(), &RenderMode::default(), true);
    let depth_fail = draw_calls(&scene);
    let depth_fail_volume = scene.commands().shadow_volume_vertices().to_vec();

    scene.draw(&camera(), &RenderMode::default(), false);
    let depth_pass = draw_calls(&scene);

    assert_eq!(depth_fail.len(), depth_pass.len());
    assert_eq!(depth_fail_volume, scene.commands().shadow_volume_vertices());

    let mut volume_draws = 0;
    for (a, b) in depth_fail.iter().zip(&depth_pass) {
        match (a.pipeline.pass, b.pipeline.pass) {
            (PassKind::ShadowVolume(StencilPolicy::DepthFail), PassKind::ShadowVolume(StencilPolicy::DepthPass)) => {
                volume_draws += 1;
                assert_eq!(a.mesh, b.mesh);
                assert_eq!(a.pipeline.program, b.pipeline.program);
            }
            _ => assert_eq!(a, b),
        }
    }
    assert_eq!(volume_draws, 2);
}

#[test]
fn shadow_mapped_frame_order() {
    let mut scene = scene(3, 2, 1);
    scene.draw_shadow_mapped(&camera(), &RenderMode::default());

    let faces = (0..6).map(PassTarget::PointShadowFace);
    let mut expected = vec![PassTarget::SCENE_CLEAR_ALL];
    for _ in 0..2 {
        expected.extend(faces.clone());
        expected.push(PassTarget::SCENE_LOAD);
    }
    expected.extend([PassTarget::SpotShadow, PassTarget::SCENE_LOAD]);

    let targets: Vec<_> = scene.commands().passes().iter().map(|pass| pass.target).collect();
    assert_eq!(targets, expected);

    assert!(
        draw_calls(&scene)
            .iter()
            .all(|draw| draw.pipeline.program != ProgramKind::InstancedShadowVolume)
    );
    assert!(scene.commands().shadow_volume_vertices().is_empty());
    assert!(scene.commands().tracker().current().color_write);
}

#[test]
fn render_mode_travels_with_the_frame() {
    let mut scene = scene(10, 1, 0);
    let mode = RenderMode {
        wireframe: true,
        msaa_level: 4,
        ..RenderMode::default()
    };
    scene.draw(&camera(), &mode, true);
    assert_eq!(scene.commands().render_mode(), mode);
}
