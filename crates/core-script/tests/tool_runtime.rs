//! End-to-end tool runtime behavior: compile, frames, params, commands.

use core_canvas::Canvas;
use core_script::{FrameContext, FramePhase, ParamValue, ScriptEngine, ScriptError, ToolCommand};
use pretty_assertions::assert_eq;

fn frame(cols: i32, rows: i32) -> FrameContext {
    FrameContext { cols, rows, focused: true, ..FrameContext::default() }
}

#[test]
fn render_entry_point_writes_cells() {
    let mut engine = ScriptEngine::new().unwrap();
    engine
        .compile(
            r#"
            function render(ctx, layer)
                layer:set(0, 0, "A", 9, 4)
                layer:set(1, 0, 65)
            end
            "#,
        )
        .unwrap();

    let mut canvas = Canvas::new(10);
    engine.run_frame(&mut canvas, 0, &frame(10, 1), false, false).unwrap();

    assert_eq!(canvas.layer_cell(0, 0, 0), 'A');
    assert_eq!(canvas.layer_cell(0, 0, 1), 'A');
    let v = canvas.layer_cell_value(0, 0, 0).unwrap();
    assert_eq!(v.fg, core_palette::xterm256_color32(9));
    assert_eq!(v.bg, core_palette::xterm256_color32(4));
}

#[test]
fn classic_main_is_wrapped_into_render() {
    let mut engine = ScriptEngine::new().unwrap();
    engine
        .compile(
            r#"
            function main(coord, context, cursor, buffer)
                if coord.x == coord.y then return "X" end
                return " "
            end
            "#,
        )
        .unwrap();

    let mut canvas = Canvas::new(4);
    canvas.set_rows(4).unwrap();
    engine.run_frame(&mut canvas, 0, &frame(4, 4), false, false).unwrap();
    for i in 0..4 {
        assert_eq!(canvas.layer_cell(0, i, i), 'X', "diagonal at {i}");
    }
    assert_eq!(canvas.layer_cell(0, 0, 1), ' ');
}

#[test]
fn missing_entry_points_are_a_compile_error() {
    let mut engine = ScriptEngine::new().unwrap();
    let err = engine.compile("local x = 1").unwrap_err();
    match err {
        ScriptError::Compile(msg) => {
            assert!(msg.contains("render"), "{msg}");
            assert!(msg.contains("main"), "{msg}");
        }
        other => panic!("expected compile error, got {other:?}"),
    }
    assert!(!engine.has_program());
}

#[test]
fn syntax_errors_carry_a_message() {
    let mut engine = ScriptEngine::new().unwrap();
    let err = engine.compile("function render( bad syntax").unwrap_err();
    assert!(matches!(err, ScriptError::Compile(_)));
}

#[test]
fn runtime_errors_keep_the_program_compiled() {
    let mut engine = ScriptEngine::new().unwrap();
    engine
        .compile(
            r#"
            function render(ctx, layer)
                if ctx.frame == 0 then error("boom") end
                layer:set(0, 0, "k")
            end
            "#,
        )
        .unwrap();

    let mut canvas = Canvas::new(5);
    let err = engine.run_frame(&mut canvas, 0, &frame(5, 1), false, false).unwrap_err();
    match err {
        ScriptError::Runtime(msg) => assert!(msg.contains("boom"), "{msg}"),
        other => panic!("expected runtime error, got {other:?}"),
    }

    // The next frame still runs.
    let ctx = FrameContext { frame: 1, ..frame(5, 1) };
    engine.run_frame(&mut canvas, 0, &ctx, false, false).unwrap();
    assert_eq!(canvas.layer_cell(0, 0, 0), 'k');
}

#[test]
fn settings_and_params_are_read_back() {
    let mut engine = ScriptEngine::new().unwrap();
    engine
        .compile(
            r##"
            settings = {
                fps = 500,
                once = true,
                fg = 200,
                bg = "#000080",
                params = {
                    size = { type = "int", default = 3, min = 1, max = 9, order = 1 },
                    mode = { type = "enum", items = { "fine", "coarse" } },
                    go = { type = "button", label = "Go" },
                },
            }
            function render(ctx, layer) end
            "##,
        )
        .unwrap();

    let settings = engine.settings();
    assert_eq!(settings.fps, Some(240)); // clamped
    assert!(settings.once);
    assert_eq!(settings.foreground, Some(200));
    assert_eq!(settings.background, Some(core_palette::nearest_xterm256(0, 0, 0x80)));

    let specs = engine.param_specs();
    assert_eq!(specs.len(), 3);
    assert_eq!(engine.param_value("size"), Some(&ParamValue::Int(3)));
    assert_eq!(engine.param_value("mode"), Some(&ParamValue::Enum("fine".into())));
    assert_eq!(engine.param_value("go"), Some(&ParamValue::Button(false)));
}

#[test]
fn malformed_params_fail_compilation_with_the_key() {
    let mut engine = ScriptEngine::new().unwrap();
    let err = engine
        .compile(
            r#"
            settings = { params = { broken = { default = 1 } } }
            function render(ctx, layer) end
            "#,
        )
        .unwrap_err();
    match err {
        ScriptError::Compile(msg) => assert!(msg.contains("broken"), "{msg}"),
        other => panic!("expected compile error, got {other:?}"),
    }
}

#[test]
fn param_values_survive_recompiles_of_same_type() {
    let mut engine = ScriptEngine::new().unwrap();
    let v1 = r#"
        settings = { params = { size = { type = "int", default = 3 } } }
        function render(ctx, layer) end
    "#;
    engine.compile(v1).unwrap();
    assert!(engine.set_param("size", ParamValue::Int(7)));

    // Same key, same type, new default: the user's value wins.
    let v2 = r#"
        settings = { params = { size = { type = "int", default = 5 } } }
        function render(ctx, layer) end
    "#;
    engine.compile(v2).unwrap();
    assert_eq!(engine.param_value("size"), Some(&ParamValue::Int(7)));

    // Type change: reset to the new default.
    let v3 = r#"
        settings = { params = { size = { type = "float", default = 2.5 } } }
        function render(ctx, layer) end
    "#;
    engine.compile(v3).unwrap();
    assert_eq!(engine.param_value("size"), Some(&ParamValue::Float(2.5)));
}

#[test]
fn button_fires_for_exactly_one_frame() {
    let mut engine = ScriptEngine::new().unwrap();
    engine
        .compile(
            r#"
            settings = { params = { go = { type = "button" } } }
            function render(ctx, layer)
                if ctx.params.go then
                    ctx.out[#ctx.out + 1] = { type = "palette.set", fg = 9 }
                end
            end
            "#,
        )
        .unwrap();

    let mut canvas = Canvas::new(5);
    assert!(engine.fire_param_button("go"));

    let cmds = engine.run_frame(&mut canvas, 0, &frame(5, 1), true, false).unwrap();
    assert_eq!(cmds, vec![ToolCommand::PaletteSet { fg: Some(9), bg: None }]);

    // Second frame without firing: the button has reset.
    let cmds = engine.run_frame(&mut canvas, 0, &frame(5, 1), true, false).unwrap();
    assert_eq!(cmds, vec![]);
}

#[test]
fn command_queue_parses_every_record_type() {
    let mut engine = ScriptEngine::new().unwrap();
    engine
        .compile(
            r#"
            function render(ctx, layer)
                ctx.out[1] = { type = "palette.set", fg = 1, bg = 2 }
                ctx.out[2] = { type = "brush.set", cp = 9608 }
                ctx.out[3] = { type = "tool.activate", id = "eraser" }
                ctx.out[4] = { type = "tool.activate_prev" }
                ctx.out[5] = { type = "canvas.crop_to_selection" }
                ctx.out[6] = { type = "mystery.unknown" }
                ctx.out[7] = { type = "brush.set" } -- missing cp: dropped
            end
            "#,
        )
        .unwrap();

    let mut canvas = Canvas::new(5);
    let cmds = engine.run_frame(&mut canvas, 0, &frame(5, 1), true, false).unwrap();
    assert_eq!(
        cmds,
        vec![
            ToolCommand::PaletteSet { fg: Some(1), bg: Some(2) },
            ToolCommand::BrushSet { cp: 9608 },
            ToolCommand::ToolActivate { id: "eraser".into() },
            ToolCommand::ToolActivatePrev,
            ToolCommand::CropToSelection,
        ]
    );
}

#[test]
fn commands_are_ignored_when_not_allowed() {
    let mut engine = ScriptEngine::new().unwrap();
    engine
        .compile(
            r#"
            function render(ctx, layer)
                ctx.out[#ctx.out + 1] = { type = "tool.activate_prev" }
            end
            "#,
        )
        .unwrap();
    let mut canvas = Canvas::new(5);
    let cmds = engine.run_frame(&mut canvas, 0, &frame(5, 1), false, false).unwrap();
    assert_eq!(cmds, vec![]);
}

#[test]
fn typed_input_reaches_the_program() {
    let mut engine = ScriptEngine::new().unwrap();
    engine
        .compile(
            r#"
            function render(ctx, layer)
                local x = 0
                for i, ch in ipairs(ctx.typed) do
                    layer:set(x, 0, ch)
                    x = x + 1
                end
            end
            "#,
        )
        .unwrap();

    let mut canvas = Canvas::new(10);
    let ctx = FrameContext { typed: vec!['H', 'i', '!'], ..frame(10, 1) };
    engine.run_frame(&mut canvas, 0, &ctx, false, false).unwrap();
    let row: String = (0..3).map(|x| canvas.layer_cell(0, 0, x)).collect();
    assert_eq!(row, "Hi!");
}

#[test]
fn selection_and_clipboard_round_trip_through_the_handle() {
    let mut engine = ScriptEngine::new().unwrap();
    engine
        .compile(
            r#"
            function render(ctx, layer)
                layer:set(0, 0, "Q", 12)
                ctx.canvas:setSelection(0, 0, 0, 0)
                ctx.canvas:copySelection()
                ctx.canvas:pasteClipboard(3, 0)
                local glyph, fg = ctx.canvas:getCell(3, 0)
                layer:set(5, 0, glyph, fg)
            end
            "#,
        )
        .unwrap();

    let mut canvas = Canvas::new(10);
    engine.run_frame(&mut canvas, 0, &frame(10, 1), false, false).unwrap();
    assert_eq!(canvas.layer_cell(0, 0, 3), 'Q');
    assert_eq!(canvas.layer_cell(0, 0, 5), 'Q');
    let v = canvas.layer_cell_value(0, 0, 5).unwrap();
    assert_eq!(v.fg, core_palette::xterm256_color32(12));
    // Paste moved the selection to the pasted rectangle.
    let sel = canvas.selection_rect().unwrap();
    assert_eq!((sel.x, sel.y, sel.w, sel.h), (3, 0, 1, 1));
}

#[test]
fn caret_writeback_is_gated() {
    let mut engine = ScriptEngine::new().unwrap();
    engine
        .compile(
            r#"
            function render(ctx, layer)
                ctx.caret.x = 4
                ctx.caret.y = 2
            end
            "#,
        )
        .unwrap();

    let mut canvas = Canvas::new(10);
    engine.run_frame(&mut canvas, 0, &frame(10, 1), false, false).unwrap();
    assert_eq!(canvas.caret(), (0, 0));

    let ctx = FrameContext { allow_caret_writeback: true, ..frame(10, 1) };
    engine.run_frame(&mut canvas, 0, &ctx, false, false).unwrap();
    assert_eq!(canvas.caret(), (2, 4));
}

#[test]
fn sandbox_has_no_io_or_os() {
    let mut engine = ScriptEngine::new().unwrap();
    engine
        .compile(
            r#"
            function render(ctx, layer)
                if io ~= nil or os ~= nil then
                    error("sandbox leak")
                end
            end
            "#,
        )
        .unwrap();
    let mut canvas = Canvas::new(5);
    engine.run_frame(&mut canvas, 0, &frame(5, 1), false, false).unwrap();
}

#[test]
fn recompile_clears_stale_tool_globals() {
    let mut engine = ScriptEngine::new().unwrap();
    engine
        .compile(
            r#"
            settings = { fg = 100 }
            function render(ctx, layer) end
            "#,
        )
        .unwrap();
    assert_eq!(engine.settings().foreground, Some(100));

    // The new program defines no settings: the old ones must not leak.
    engine.compile("function render(ctx, layer) end").unwrap();
    assert_eq!(engine.settings().foreground, None);
}

#[test]
fn clear_layer_first_applies_settings_fill() {
    let mut engine = ScriptEngine::new().unwrap();
    engine
        .compile(
            r#"
            settings = { bg = 17 }
            function render(ctx, layer) end
            "#,
        )
        .unwrap();

    let mut canvas = Canvas::new(4);
    canvas.set_cell(0, 0, core_canvas::CellWrite::glyph('x'));
    engine.run_frame(&mut canvas, 0, &frame(4, 1), false, true).unwrap();
    assert_eq!(canvas.layer_cell(0, 0, 0), ' ');
    let v = canvas.layer_cell_value(0, 0, 1).unwrap();
    assert_eq!(v.bg, core_palette::xterm256_color32(17));
}

#[test]
fn phase_is_visible_to_the_program() {
    let mut engine = ScriptEngine::new().unwrap();
    engine
        .compile(
            r#"
            function render(ctx, layer)
                if ctx.phase == 0 then layer:set(0, 0, "K") end
                if ctx.phase == 1 then layer:set(1, 0, "M") end
            end
            "#,
        )
        .unwrap();

    let mut canvas = Canvas::new(5);
    engine.run_frame(&mut canvas, 0, &frame(5, 1), false, false).unwrap();
    let mouse = FrameContext { phase: FramePhase::Mouse, ..frame(5, 1) };
    engine.run_frame(&mut canvas, 0, &mouse, false, false).unwrap();
    assert_eq!(canvas.layer_cell(0, 0, 0), 'K');
    assert_eq!(canvas.layer_cell(0, 0, 1), 'M');
}
