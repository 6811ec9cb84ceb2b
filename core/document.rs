use crate::error::{AppError, Result};
use crate::walker::{DirectoryNode, FileRef, ProjectWalk, walk_project};
use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, Event};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

pub const DEFAULT_INDENT: usize = 2;
const CDATA_TERMINATOR: &str = "]]>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContextInfo {
    pub path: String,
    pub content: String,
}

/// The local-mode artifact: a directory tree plus the verbatim contents of
/// every packaged file, in walk order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedDocument {
    pub project_name: String,
    pub tree: DirectoryNode,
    pub contents: Vec<FileContextInfo>,
}

/// Reads every content file of `walk` and assembles the document.
///
/// A file that cannot be read, is not UTF-8, or holds a character XML 1.0
/// forbids (form feed, escape, NUL) is logged and left out; the build itself
/// never fails.
pub fn build_document(walk: &ProjectWalk, project_name: Option<&str>) -> PackagedDocument {
    log::info!("Reading content for {} files...", walk.files.len());
    let mut contents = Vec::with_capacity(walk.files.len());
    let mut seen = HashSet::new();

    for file_ref in &walk.files {
        if !seen.insert(file_ref.path.as_str()) {
            log::warn!("Skipping duplicate path: {}", file_ref.path);
            continue;
        }
        match read_file_ref(walk, file_ref) {
            Ok(content) => contents.push(FileContextInfo {
                path: file_ref.path.clone(),
                content,
            }),
            Err(e) => log::error!("Skipping file: {}", e),
        }
    }
    log::info!(
        "File reading complete. {} of {} files packaged.",
        contents.len(),
        walk.files.len()
    );

    PackagedDocument {
        project_name: project_name
            .map(str::to_string)
            .unwrap_or_else(|| walk.root.name.clone()),
        tree: walk.root.clone(),
        contents,
    }
}

/// Walks `root` with the built-in policy and builds its document.
pub fn package_project(root: &Path, project_name: Option<&str>) -> Result<PackagedDocument> {
    let walk = walk_project(root)?;
    Ok(build_document(&walk, project_name))
}

fn read_file_ref(walk: &ProjectWalk, file_ref: &FileRef) -> Result<String> {
    let full_path = walk.root_path.join(&file_ref.path);
    let bytes = fs::read(&full_path).map_err(|e| AppError::FilesystemAccess {
        path: full_path,
        source: e,
    })?;
    let content = String::from_utf8(bytes).map_err(|_| AppError::Decode {
        path: file_ref.path.clone(),
        reason: "is not valid UTF-8 text".to_string(),
    })?;
    if let Some(c) = first_illegal_char(&content) {
        return Err(AppError::Decode {
            path: file_ref.path.clone(),
            reason: format!("contains U+{:04X}, which XML 1.0 cannot carry", u32::from(c)),
        });
    }
    Ok(content)
}

/// First character outside the XML 1.0 `Char` production, if any.
///
/// CDATA does not lift this restriction, so such text cannot be packaged at all.
fn first_illegal_char(text: &str) -> Option<char> {
    text.chars().find(|&c| match c {
        '\t' | '\n' | '\r' => false,
        '\u{fffe}' | '\u{ffff}' => true,
        c => c < '\u{20}',
    })
}

impl PackagedDocument {
    pub fn to_xml(&self) -> Result<String> {
        self.to_xml_with_indent(DEFAULT_INDENT)
    }

    /// Renders the document in one pass; file bodies go out as CDATA sections.
    ///
    /// A body holding a character XML 1.0 forbids fails with
    /// [`AppError::XmlSerialize`]. Bodies are otherwise written byte for byte,
    /// but a conforming parser normalizes `\r\n` and lone `\r` to `\n` inside
    /// CDATA, so only [`PackagedDocument::from_xml`] gives back carriage returns.
    pub fn to_xml_with_indent(&self, indent: usize) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', indent);

        emit(
            &mut writer,
            Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)),
        )?;
        let project =
            BytesStart::new("project").with_attributes([("name", self.project_name.as_str())]);
        emit(&mut writer, Event::Start(project))?;

        emit(&mut writer, Event::Start(BytesStart::new("directory_tree")))?;
        write_directory(&mut writer, &self.tree)?;
        emit(&mut writer, Event::End(BytesEnd::new("directory_tree")))?;

        if self.contents.is_empty() {
            emit(&mut writer, Event::Empty(BytesStart::new("file_contents")))?;
        } else {
            emit(&mut writer, Event::Start(BytesStart::new("file_contents")))?;
            for file in &self.contents {
                if let Some(c) = first_illegal_char(&file.content) {
                    return Err(AppError::XmlSerialize(format!(
                        "'{}' contains U+{:04X}, which XML 1.0 cannot carry",
                        file.path,
                        u32::from(c)
                    )));
                }
                let start = BytesStart::new("file").with_attributes([("path", file.path.as_str())]);
                emit(&mut writer, Event::Start(start))?;
                for section in cdata_sections(&file.content) {
                    emit(&mut writer, Event::CData(BytesCData::new(section)))?;
                }
                emit(&mut writer, Event::End(BytesEnd::new("file")))?;
            }
            emit(&mut writer, Event::End(BytesEnd::new("file_contents")))?;
        }

        emit(&mut writer, Event::End(BytesEnd::new("project")))?;
        String::from_utf8(writer.into_inner())
            .map_err(|e| AppError::XmlSerialize(e.to_string()))
    }

    /// Parses a document produced by [`PackagedDocument::to_xml`].
    pub fn from_xml(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        let mut project_name: Option<String> = None;
        let mut section = Section::None;
        let mut stack: Vec<DirectoryNode> = Vec::new();
        let mut tree: Option<DirectoryNode> = None;
        let mut contents = Vec::new();
        let mut current_file: Option<FileContextInfo> = None;

        loop {
            match reader.read_event()? {
                Event::Start(e) => match (e.name().as_ref(), section) {
                    (b"project", _) => project_name = Some(attribute(&e, "name")?),
                    (b"directory_tree", _) => section = Section::Tree,
                    (b"file_contents", _) => section = Section::Contents,
                    (b"directory", Section::Tree) => {
                        stack.push(DirectoryNode::new(attribute(&e, "name")?));
                    }
                    (b"file", Section::Tree) => attach_file(&mut stack, &e)?,
                    (b"file", Section::Contents) => {
                        current_file = Some(FileContextInfo {
                            path: attribute(&e, "path")?,
                            content: String::new(),
                        });
                    }
                    _ => {}
                },
                Event::Empty(e) => match (e.name().as_ref(), section) {
                    (b"directory", Section::Tree) => {
                        let node = DirectoryNode::new(attribute(&e, "name")?);
                        attach_directory(&mut stack, &mut tree, node);
                    }
                    (b"file", Section::Tree) => attach_file(&mut stack, &e)?,
                    (b"file", Section::Contents) => contents.push(FileContextInfo {
                        path: attribute(&e, "path")?,
                        content: String::new(),
                    }),
                    _ => {}
                },
                Event::CData(e) => {
                    if let Some(file) = current_file.as_mut() {
                        let bytes = e.into_inner();
                        let text = std::str::from_utf8(&bytes).map_err(xml_parse_error)?;
                        file.content.push_str(text);
                    }
                }
                Event::End(e) => match (e.name().as_ref(), section) {
                    (b"directory", Section::Tree) => {
                        let node = stack.pop().ok_or_else(|| {
                            AppError::XmlParse("unbalanced </directory>".to_string())
                        })?;
                        attach_directory(&mut stack, &mut tree, node);
                    }
                    (b"file", Section::Contents) => {
                        if let Some(file) = current_file.take() {
                            contents.push(file);
                        }
                    }
                    (b"directory_tree", _) | (b"file_contents", _) => section = Section::None,
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(PackagedDocument {
            project_name: project_name
                .ok_or_else(|| AppError::XmlParse("missing <project> element".to_string()))?,
            tree: tree
                .ok_or_else(|| AppError::XmlParse("missing <directory> root".to_string()))?,
            contents,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Tree,
    Contents,
}

fn emit(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| AppError::XmlSerialize(e.to_string()))
}

fn write_directory(writer: &mut Writer<Vec<u8>>, node: &DirectoryNode) -> Result<()> {
    let start = BytesStart::new("directory").with_attributes([("name", node.name.as_str())]);
    if node.directories.is_empty() && node.files.is_empty() {
        return emit(writer, Event::Empty(start));
    }
    emit(writer, Event::Start(start))?;
    for child in &node.directories {
        write_directory(writer, child)?;
    }
    for file in &node.files {
        emit(
            writer,
            Event::Empty(BytesStart::new("file").with_attributes([
                ("name", file.name.as_str()),
                ("path", file.path.as_str()),
            ])),
        )?;
    }
    emit(writer, Event::End(BytesEnd::new("directory")))
}

/// Splits text so that no section contains the CDATA terminator.
///
/// Each cut falls between `]]` and `>`, so concatenating the sections gives
/// back the original text.
fn cdata_sections(text: &str) -> Vec<&str> {
    let mut sections = Vec::new();
    let mut rest = text;
    while let Some(pos) = rest.find(CDATA_TERMINATOR) {
        sections.push(&rest[..pos + 2]);
        rest = &rest[pos + 2..];
    }
    sections.push(rest);
    sections
}

fn attribute(element: &BytesStart<'_>, key: &str) -> Result<String> {
    let attr = element
        .try_get_attribute(key)
        .map_err(xml_parse_error)?
        .ok_or_else(|| {
            AppError::XmlParse(format!(
                "<{}> is missing the '{}' attribute",
                String::from_utf8_lossy(element.name().as_ref()),
                key
            ))
        })?;
    let value = attr.unescape_value().map_err(xml_parse_error)?;
    Ok(value.into_owned())
}

fn attach_file(stack: &mut [DirectoryNode], element: &BytesStart<'_>) -> Result<()> {
    let parent = stack
        .last_mut()
        .ok_or_else(|| AppError::XmlParse("<file> outside of a <directory>".to_string()))?;
    parent.files.push(FileRef {
        name: attribute(element, "name")?,
        path: attribute(element, "path")?,
    });
    Ok(())
}

fn attach_directory(
    stack: &mut [DirectoryNode],
    tree: &mut Option<DirectoryNode>,
    node: DirectoryNode,
) {
    match stack.last_mut() {
        Some(parent) => parent.directories.push(node),
        None => *tree = Some(node),
    }
}

fn xml_parse_error(err: impl std::fmt::Display) -> AppError {
    AppError::XmlParse(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn sample_document(content: &str) -> PackagedDocument {
        let mut root = DirectoryNode::new("demo");
        let mut src = DirectoryNode::new("src");
        src.files.push(FileRef {
            name: "main.py".to_string(),
            path: "src/main.py".to_string(),
        });
        root.directories.push(src);
        root.directories.push(DirectoryNode::new("empty"));
        root.files.push(FileRef {
            name: "init.lua".to_string(),
            path: "init.lua".to_string(),
        });
        PackagedDocument {
            project_name: "demo".to_string(),
            tree: root,
            contents: vec![FileContextInfo {
                path: "src/main.py".to_string(),
                content: content.to_string(),
            }],
        }
    }

    #[test]
    fn renders_expected_shape() {
        let xml = sample_document("print('hi')").to_xml().unwrap();
        let expected = r#"<?xml version="1.0" encoding="UTF-8"?>
<project name="demo">
  <directory_tree>
    <directory name="demo">
      <directory name="src">
        <file name="main.py" path="src/main.py"/>
      </directory>
      <directory name="empty"/>
      <file name="init.lua" path="init.lua"/>
    </directory>
  </directory_tree>
  <file_contents>
    <file path="src/main.py"><![CDATA[print('hi')]]></file>
  </file_contents>
</project>"#;
        assert_eq!(xml, expected);
    }

    #[test]
    fn markup_in_content_survives_round_trip() {
        let nasty = "<root attr=\"1\">&amp; & < > </file></project>\n<![CDATA[x]]>\n]]]]>>\n";
        let doc = sample_document(nasty);
        let parsed = PackagedDocument::from_xml(&doc.to_xml().unwrap()).unwrap();
        assert_eq!(parsed.contents[0].content, nasty);
        assert_eq!(parsed, doc);
    }

    #[test]
    fn content_edge_cases_round_trip() {
        for content in ["", "]]>", "]]", "]", ">", "a]]>b]]>c", "  leading\n\ttabs  \n"] {
            let doc = sample_document(content);
            let parsed = PackagedDocument::from_xml(&doc.to_xml().unwrap()).unwrap();
            assert_eq!(parsed.contents[0].content, content, "content {content:?}");
        }
    }

    #[test]
    fn cdata_sections_never_contain_terminator() {
        let sections = cdata_sections("one]]>two]]>]]>three");
        assert!(sections.iter().all(|s| !s.contains(CDATA_TERMINATOR)));
        assert_eq!(sections.concat(), "one]]>two]]>]]>three");
    }

    #[test]
    fn attributes_are_escaped() {
        let mut doc = sample_document("x");
        doc.project_name = "a<b & \"c\"".to_string();
        let xml = doc.to_xml().unwrap();
        assert!(xml.contains(r#"name="a&lt;b &amp; &quot;c&quot;""#));
        let parsed = PackagedDocument::from_xml(&xml).unwrap();
        assert_eq!(parsed.project_name, "a<b & \"c\"");
    }

    #[test]
    fn empty_contents_render_as_empty_element() {
        let mut doc = sample_document("x");
        doc.contents.clear();
        let xml = doc.to_xml().unwrap();
        assert!(xml.contains("<file_contents/>"));
        assert!(PackagedDocument::from_xml(&xml).unwrap().contents.is_empty());
    }

    #[test]
    fn indent_width_is_configurable() {
        let xml = sample_document("x").to_xml_with_indent(4).unwrap();
        assert!(xml.contains("\n    <directory_tree>"));
    }

    #[test]
    fn build_skips_unreadable_and_non_utf8_files() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        std::fs::write(root.join("good.py"), "ok = True").unwrap();
        std::fs::write(root.join("latin1.py"), [0x63, 0x61, 0x66, 0xe9]).unwrap();
        let mut walk = walk_project(root).unwrap();
        walk.files.push(FileRef {
            name: "vanished.py".to_string(),
            path: "vanished.py".to_string(),
        });

        let doc = build_document(&walk, None);
        let paths: Vec<&str> = doc.contents.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["good.py"]);
        assert_eq!(doc.contents[0].content, "ok = True");
    }

    #[test]
    fn build_skips_files_with_xml_illegal_characters() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        std::fs::write(root.join("ansi.py"), "ESC = '\x1b[0m'\n").unwrap();
        std::fs::write(root.join("paged.py"), "x = 1\x0c\nend\r\n").unwrap();
        std::fs::write(root.join("plain.py"), "tab\there\r\n").unwrap();
        let walk = walk_project(root).unwrap();

        let doc = build_document(&walk, None);
        let paths: Vec<&str> = doc.contents.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["plain.py"]);
        assert_eq!(doc.contents[0].content, "tab\there\r\n");
        assert!(!doc.to_xml().unwrap().contains('\u{1b}'));
    }

    #[test]
    fn to_xml_rejects_xml_illegal_characters() {
        for body in ["page\x0cbreak", "nul\0", "odd\u{fffe}"] {
            let err = sample_document(body).to_xml().unwrap_err();
            assert!(matches!(err, AppError::XmlSerialize(_)), "{body:?}");
        }
        assert!(sample_document("\u{85} next line is allowed").to_xml().is_ok());
    }

    #[test]
    fn project_name_override_applies_to_project_only() {
        let walk = ProjectWalk {
            root_path: PathBuf::from("/nonexistent"),
            root: DirectoryNode::new("checkout"),
            files: Vec::new(),
        };
        let doc = build_document(&walk, Some("Renamed"));
        assert_eq!(doc.project_name, "Renamed");
        assert_eq!(doc.tree.name, "checkout");
    }

    #[test]
    fn rejects_document_without_project() {
        assert!(PackagedDocument::from_xml("<other/>").is_err());
    }
}
