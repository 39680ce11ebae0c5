//! Render the confirmed canvas to an HTML file.
//!
//! Walks the chain through the art-app RPC only, so it works against
//! any miner: children from genesis, longest path wins, live shapes
//! concatenate into one `<svg>` element.

use std::path::Path;

use super::Canvas;
use crate::gateway::ArtError;
use crate::types::CanvasSettings;

/// SVG elements of every live shape along the miner's best chain, in
/// chain order.
///
/// # Errors
/// Propagates any RPC failure except the expected
/// [`ArtError::InvalidShapeHash`] for shapes deleted later in the
/// chain, which are skipped.
pub async fn get_all_svgs(canvas: &mut Canvas) -> Result<Vec<String>, ArtError> {
    let genesis = canvas.get_genesis_block().await?;

    // Depth-first over the block tree, keeping the longest
    // genesis-to-leaf path.
    let mut longest: Vec<String> = Vec::new();
    let mut stack: Vec<(String, Vec<String>)> = vec![(genesis, Vec::new())];

    while let Some((block, path)) = stack.pop() {
        let children = canvas.get_children(&block).await?;

        if children.is_empty() {
            if path.len() > longest.len() {
                longest = path;
            }
            continue;
        }

        for child in children {
            let mut extended = path.clone();
            extended.push(child.clone());
            stack.push((child, extended));
        }
    }

    let mut svgs = Vec::new();
    for block in longest {
        for shape_id in canvas.get_shapes(&block).await? {
            match canvas.get_svg_string(&shape_id).await {
                Ok(svg) => svgs.push(svg),
                // Deleted further down the chain.
                Err(ArtError::InvalidShapeHash(_)) => {}
                Err(e) => return Err(e),
            }
        }
    }

    Ok(svgs)
}

/// Write `Canvas.html`-style output: one `<svg>` sized to the canvas,
/// wrapping the given path elements.
///
/// # Errors
/// Propagates filesystem failures.
pub fn write_canvas_html(
    path: &Path,
    svgs: &[String],
    settings: &CanvasSettings,
) -> std::io::Result<()> {
    let mut doc = format!(
        "<svg width=\"{}\" height=\"{}\">",
        settings.x_max, settings.y_max
    );
    for svg in svgs {
        doc.push_str(svg);
    }
    doc.push_str("</svg>");

    std::fs::write(path, doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_document_shape() {
        let dir = std::env::temp_dir().join("blockart-html-test");
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("Canvas.html");

        let settings = CanvasSettings {
            x_max: 1024,
            y_max: 768,
        };
        let svgs = vec![
            "<path d=\"M 0 0 L 10 0\" stroke=\"red\" fill=\"transparent\" />".to_string(),
            "<path d=\"M 20 0 L 30 0\" stroke=\"blue\" fill=\"transparent\" />".to_string(),
        ];

        write_canvas_html(&file, &svgs, &settings).unwrap();

        let written = std::fs::read_to_string(&file).unwrap();
        assert!(written.starts_with("<svg width=\"1024\" height=\"768\">"));
        assert!(written.ends_with("</svg>"));

        let first = written.find("M 0 0 L 10 0").unwrap();
        let second = written.find("M 20 0 L 30 0").unwrap();
        assert!(first < second, "chain order is preserved");

        std::fs::remove_file(&file).ok();
    }
}
