use text_to_media_rust::{PROMPT_SUFFIX, build_prompt};

#[test]
fn image_prompt_snapshot() {
    let prompt = build_prompt("窗邊的貓\n午後的陽光");
    insta::assert_snapshot!(prompt);
}

#[test]
fn prompt_ends_with_suffix() {
    assert!(build_prompt("海").ends_with(PROMPT_SUFFIX));
}
