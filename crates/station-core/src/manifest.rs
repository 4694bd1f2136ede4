//! # Content Manifest
//!
//! JSON snapshot of a station that the controller node stores and that the
//! repository persists.
//!
//! ## Layout
//! ```text
//! {
//!   "name": "Museum",
//!   "folderIdCounter": 3, "contentIdCounter": 2, "nodeIdCounter": 2, "tagIdCounter": 1,
//!   "rootFolder": {
//!     "id": 0, "name": "root",
//!     "subfolders": [ { "id": 1, "name": "Hall", "subfolders": [], "contents": [] } ],
//!     "contents": [
//!       { "id": 0, "name": "Intro", "lightIntensity": 1, "tagIds": [0],
//!         "media": [ { "nodeId": 1, "type": "video", "idOnDevice": 12,
//!                      "duration": 31.5, "fileName": "intro.mp4" } ] }
//!     ]
//!   },
//!   "nodes": [ { "id": 0, "name": "Controller", "ip": "10.0.0.1", "role": "controller" } ],
//!   "tags":  [ { "id": 0, "name": "evening" } ]
//! }
//! ```
//!
//! ## Parsing
//! Import walks the JSON by hand so a missing property is reported with its
//! full path (`rootFolder.subfolders[0].contents[2].name`) instead of a
//! generic deserializer message.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{CoreError, CoreResult};
use crate::folder::{Content, Folder};
use crate::registry::{NodeRegistry, TagRegistry};
use crate::station::Station;
use crate::types::{
    ContentId, DeviceMediaId, FolderId, Media, MediaKind, Node, NodeId, NodeRole, StationId, Tag,
    TagId,
};

// =============================================================================
// Schema Types
// =============================================================================

/// Top-level manifest document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestDoc {
    pub name: String,
    pub folder_id_counter: u32,
    pub content_id_counter: u32,
    pub node_id_counter: u32,
    pub tag_id_counter: u32,
    pub root_folder: FolderDoc,
    pub nodes: Vec<Node>,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderDoc {
    pub id: FolderId,
    pub name: String,
    pub subfolders: Vec<FolderDoc>,
    pub contents: Vec<ContentDoc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentDoc {
    pub id: ContentId,
    pub name: String,
    pub light_intensity: u8,
    pub tag_ids: Vec<TagId>,
    pub media: Vec<MediaDoc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaDoc {
    pub node_id: NodeId,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    pub id_on_device: DeviceMediaId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub file_name: String,
}

// =============================================================================
// Export
// =============================================================================

impl Station {
    /// Builds the manifest document for this station.
    pub fn to_manifest(&self) -> ManifestDoc {
        ManifestDoc {
            name: self.name.clone(),
            folder_id_counter: self.folder_id_counter,
            content_id_counter: self.content_id_counter,
            node_id_counter: self.node_id_counter,
            tag_id_counter: self.tag_id_counter,
            root_folder: folder_doc(&self.root_folder),
            nodes: self.nodes.iter().cloned().collect(),
            tags: self.tags.iter().cloned().collect(),
        }
    }

    pub fn to_manifest_json(&self) -> CoreResult<String> {
        Ok(serde_json::to_string(&self.to_manifest())?)
    }

    /// Rebuilds a station from manifest JSON.
    pub fn from_manifest_json(id: StationId, json: &str) -> CoreResult<Station> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_manifest_value(id, &value)
    }

    pub fn from_manifest_value(id: StationId, value: &Value) -> CoreResult<Station> {
        let doc = as_object(value, "")?;

        let name = req_str(doc, "", "name")?;
        let mut folder_id_counter = req_u32(doc, "", "folderIdCounter")?;
        let mut content_id_counter = req_u32(doc, "", "contentIdCounter")?;
        let mut node_id_counter = req_u32(doc, "", "nodeIdCounter")?;
        let mut tag_id_counter = req_u32(doc, "", "tagIdCounter")?;

        let mut nodes = NodeRegistry::new();
        for (i, node) in req_array(doc, "", "nodes")?.iter().enumerate() {
            let node = parse_node(node, &format!("nodes[{i}]"))?;
            node_id_counter = node_id_counter.max(id_after(node.id, &format!("nodes[{i}].id"))?);
            nodes.add(node)?;
        }

        let mut tags = TagRegistry::new();
        for (i, tag) in req_array(doc, "", "tags")?.iter().enumerate() {
            let tag = parse_tag(tag, &format!("tags[{i}]"))?;
            tag_id_counter = tag_id_counter.max(id_after(tag.id, &format!("tags[{i}].id"))?);
            tags.add(tag);
        }

        let root = require(doc, "", "rootFolder")?;
        let root_folder = parse_folder(root, "rootFolder", None, &nodes)?;

        // Counters never hand out an id that is already in use
        for folder_id in root_folder.folder_ids() {
            folder_id_counter = folder_id_counter.max(id_after(folder_id, "rootFolder")?);
        }
        for content in root_folder.all_contents() {
            content_id_counter = content_id_counter.max(id_after(content.id, "rootFolder")?);
        }

        Ok(Station {
            id,
            name,
            root_folder,
            tags,
            nodes,
            folder_id_counter,
            content_id_counter,
            node_id_counter,
            tag_id_counter,
        })
    }
}

fn folder_doc(folder: &Folder) -> FolderDoc {
    FolderDoc {
        id: folder.id,
        name: folder.name.clone(),
        subfolders: folder.subfolders.iter().map(folder_doc).collect(),
        contents: folder.contents.iter().map(content_doc).collect(),
    }
}

fn content_doc(content: &Content) -> ContentDoc {
    ContentDoc {
        id: content.id,
        name: content.name.clone(),
        light_intensity: content.light_intensity,
        tag_ids: content.tag_ids.clone(),
        media: content.media.values().map(media_doc).collect(),
    }
}

fn media_doc(media: &Media) -> MediaDoc {
    let (media_type, duration) = match media.kind {
        MediaKind::Image => (MediaType::Image, None),
        MediaKind::Video { duration } => (MediaType::Video, Some(duration)),
    };
    MediaDoc {
        node_id: media.node_id,
        media_type,
        id_on_device: media.id_on_device,
        duration,
        file_name: media.file_name.clone(),
    }
}

// =============================================================================
// Import
// =============================================================================

fn parse_node(value: &Value, path: &str) -> CoreResult<Node> {
    let obj = as_object(value, path)?;
    let role = req_str(obj, path, "role")?;
    let role = role
        .parse::<NodeRole>()
        .map_err(|_| CoreError::InvalidManifestField {
            path: join(path, "role"),
            expected: "\"controller\" or \"default\"".to_string(),
        })?;
    Ok(Node {
        id: req_u32(obj, path, "id")?,
        name: req_str(obj, path, "name")?,
        ip: req_str(obj, path, "ip")?,
        role,
    })
}

fn parse_tag(value: &Value, path: &str) -> CoreResult<Tag> {
    let obj = as_object(value, path)?;
    Ok(Tag {
        id: req_u32(obj, path, "id")?,
        name: req_str(obj, path, "name")?,
    })
}

fn parse_folder(
    value: &Value,
    path: &str,
    parent_id: Option<FolderId>,
    nodes: &NodeRegistry,
) -> CoreResult<Folder> {
    let obj = as_object(value, path)?;
    let mut folder = Folder::new(req_u32(obj, path, "id")?, req_str(obj, path, "name")?, parent_id);

    for (i, sub) in req_array(obj, path, "subfolders")?.iter().enumerate() {
        let sub_path = format!("{}[{i}]", join(path, "subfolders"));
        folder
            .subfolders
            .push(parse_folder(sub, &sub_path, Some(folder.id), nodes)?);
    }

    for (i, content) in req_array(obj, path, "contents")?.iter().enumerate() {
        let content_path = format!("{}[{i}]", join(path, "contents"));
        folder
            .contents
            .push(parse_content(content, &content_path, folder.id, nodes)?);
    }

    Ok(folder)
}

fn parse_content(
    value: &Value,
    path: &str,
    folder_id: FolderId,
    nodes: &NodeRegistry,
) -> CoreResult<Content> {
    let obj = as_object(value, path)?;
    let mut content = Content::new(req_u32(obj, path, "id")?, req_str(obj, path, "name")?, folder_id);

    if let Some(level) = obj.get("lightIntensity") {
        content.light_intensity = level
            .as_u64()
            .and_then(|v| u8::try_from(v).ok())
            .filter(|v| *v <= crate::types::MAX_LIGHT_INTENSITY)
            .ok_or_else(|| CoreError::InvalidManifestField {
                path: join(path, "lightIntensity"),
                expected: "0, 1 or 2".to_string(),
            })?;
    }

    let tags_path = join(path, "tagIds");
    for (i, tag) in req_array(obj, path, "tagIds")?.iter().enumerate() {
        let tag_id = as_u32(tag, &format!("{tags_path}[{i}]"))?;
        content.add_tag(tag_id);
    }

    let media_path = join(path, "media");
    for (i, media) in req_array(obj, path, "media")?.iter().enumerate() {
        let media = parse_media(media, &format!("{media_path}[{i}]"), nodes)?;
        content.set_media(media);
    }

    Ok(content)
}

fn parse_media(value: &Value, path: &str, nodes: &NodeRegistry) -> CoreResult<Media> {
    let obj = as_object(value, path)?;

    let node_id = req_u32(obj, path, "nodeId")?;
    if !nodes.contains(node_id) {
        return Err(CoreError::InvalidManifestField {
            path: join(path, "nodeId"),
            expected: "the id of a node listed in 'nodes'".to_string(),
        });
    }

    let kind = match req_str(obj, path, "type")?.as_str() {
        "image" => MediaKind::Image,
        "video" => {
            let duration_path = join(path, "duration");
            let duration = require(obj, path, "duration")?
                .as_f64()
                .ok_or_else(|| invalid(&duration_path, "a number"))?;
            MediaKind::Video { duration }
        }
        _ => {
            return Err(CoreError::InvalidManifestField {
                path: join(path, "type"),
                expected: "\"image\" or \"video\"".to_string(),
            })
        }
    };

    let id_path = join(path, "idOnDevice");
    let id_on_device = require(obj, path, "idOnDevice")?
        .as_i64()
        .ok_or_else(|| invalid(&id_path, "an integer"))?;

    let file_name = match obj.get("fileName") {
        Some(v) => v
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| invalid(&join(path, "fileName"), "a string"))?,
        None => String::new(),
    };

    Ok(Media {
        node_id,
        id_on_device,
        file_name,
        kind,
    })
}

// =============================================================================
// Field Helpers
// =============================================================================

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

fn invalid(path: &str, expected: &str) -> CoreError {
    CoreError::InvalidManifestField {
        path: if path.is_empty() { "<root>".to_string() } else { path.to_string() },
        expected: expected.to_string(),
    }
}

/// The counter value that follows an imported id.
fn id_after(id: u32, path: &str) -> CoreResult<u32> {
    id.checked_add(1)
        .ok_or_else(|| invalid(path, "an id below 4294967295"))
}

fn as_object<'a>(value: &'a Value, path: &str) -> CoreResult<&'a Map<String, Value>> {
    value.as_object().ok_or_else(|| invalid(path, "an object"))
}

fn as_u32(value: &Value, path: &str) -> CoreResult<u32> {
    value
        .as_u64()
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| invalid(path, "a non-negative integer"))
}

fn require<'a>(obj: &'a Map<String, Value>, path: &str, key: &str) -> CoreResult<&'a Value> {
    match obj.get(key) {
        Some(Value::Null) | None => Err(CoreError::MissingManifestField {
            path: join(path, key),
        }),
        Some(value) => Ok(value),
    }
}

fn req_str(obj: &Map<String, Value>, path: &str, key: &str) -> CoreResult<String> {
    require(obj, path, key)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| invalid(&join(path, key), "a string"))
}

fn req_u32(obj: &Map<String, Value>, path: &str, key: &str) -> CoreResult<u32> {
    as_u32(require(obj, path, key)?, &join(path, key))
}

fn req_array<'a>(
    obj: &'a Map<String, Value>,
    path: &str,
    key: &str,
) -> CoreResult<&'a Vec<Value>> {
    require(obj, path, key)?
        .as_array()
        .ok_or_else(|| invalid(&join(path, key), "an array"))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ROOT_FOLDER_ID;
    use serde_json::json;

    fn sample_station() -> Station {
        let mut station = Station::new(7, "Museum");
        station
            .add_node("Controller", "10.0.0.1", NodeRole::Controller)
            .unwrap();
        station
            .add_node("Player", "10.0.0.2", NodeRole::Default)
            .unwrap();
        let hall = station.add_folder(ROOT_FOLDER_ID, "Hall").unwrap();
        let intro = station.add_content(hall, "Intro").unwrap();
        let tag = station.add_tag("evening").unwrap();
        station.tag_content(intro, tag).unwrap();
        station.set_light_intensity(intro, 1).unwrap();
        station
            .set_media(intro, Media::video(1, "intro.mp4", 31.5))
            .unwrap();
        station.set_media_device_id(intro, 1, 12).unwrap();
        station
            .set_media(intro, Media::image(0, "still.png"))
            .unwrap();
        station
    }

    #[test]
    fn test_export_layout() {
        let value = serde_json::to_value(sample_station().to_manifest()).unwrap();

        assert_eq!(value["name"], "Museum");
        assert_eq!(value["folderIdCounter"], 2);
        assert_eq!(value["nodeIdCounter"], 2);
        assert_eq!(value["rootFolder"]["id"], 0);
        assert_eq!(value["nodes"][0]["role"], "controller");

        let content = &value["rootFolder"]["subfolders"][0]["contents"][0];
        assert_eq!(content["name"], "Intro");
        assert_eq!(content["tagIds"], json!([0]));
        assert_eq!(content["media"][0]["type"], "image");
        assert!(content["media"][0].get("duration").is_none());
        assert_eq!(content["media"][1]["type"], "video");
        assert_eq!(content["media"][1]["idOnDevice"], 12);
        assert_eq!(content["media"][1]["duration"], 31.5);
    }

    #[test]
    fn test_import_restores_station() {
        let station = sample_station();
        let json = station.to_manifest_json().unwrap();
        let restored = Station::from_manifest_json(station.id, &json).unwrap();
        assert_eq!(restored, station);

        // Parent references are rebuilt, never read from JSON
        let hall = restored.folder(1).unwrap();
        assert_eq!(hall.parent_id, Some(ROOT_FOLDER_ID));
    }

    #[test]
    fn test_missing_property_is_named() {
        let mut value = serde_json::to_value(sample_station().to_manifest()).unwrap();
        value["rootFolder"]["subfolders"][0]["contents"][0]
            .as_object_mut()
            .unwrap()
            .remove("name");

        let err = Station::from_manifest_value(1, &value).unwrap_err();
        match err {
            CoreError::MissingManifestField { path } => {
                assert_eq!(path, "rootFolder.subfolders[0].contents[0].name")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_top_level_property() {
        let err = Station::from_manifest_json(1, r#"{"name":"x"}"#).unwrap_err();
        assert!(matches!(
            err,
            CoreError::MissingManifestField { ref path } if path == "folderIdCounter"
        ));
    }

    #[test]
    fn test_video_requires_duration() {
        let mut value = serde_json::to_value(sample_station().to_manifest()).unwrap();
        value["rootFolder"]["subfolders"][0]["contents"][0]["media"][1]
            .as_object_mut()
            .unwrap()
            .remove("duration");

        let err = Station::from_manifest_value(1, &value).unwrap_err();
        assert!(matches!(
            err,
            CoreError::MissingManifestField { ref path }
                if path == "rootFolder.subfolders[0].contents[0].media[1].duration"
        ));
    }

    #[test]
    fn test_wrong_types_are_rejected() {
        let mut value = serde_json::to_value(sample_station().to_manifest()).unwrap();
        value["nodes"][1]["role"] = json!("boss");
        assert!(matches!(
            Station::from_manifest_value(1, &value),
            Err(CoreError::InvalidManifestField { ref path, .. }) if path == "nodes[1].role"
        ));

        let mut value = serde_json::to_value(sample_station().to_manifest()).unwrap();
        value["tagIdCounter"] = json!("one");
        assert!(matches!(
            Station::from_manifest_value(1, &value),
            Err(CoreError::InvalidManifestField { ref path, .. }) if path == "tagIdCounter"
        ));

        assert!(matches!(
            Station::from_manifest_json(1, "not json"),
            Err(CoreError::ManifestJson(_))
        ));
    }

    #[test]
    fn test_media_for_unknown_node_rejected() {
        let mut value = serde_json::to_value(sample_station().to_manifest()).unwrap();
        value["rootFolder"]["subfolders"][0]["contents"][0]["media"][0]["nodeId"] = json!(9);
        assert!(matches!(
            Station::from_manifest_value(1, &value),
            Err(CoreError::InvalidManifestField { .. })
        ));
    }

    #[test]
    fn test_largest_ids_are_rejected() {
        let mut value = serde_json::to_value(sample_station().to_manifest()).unwrap();
        value["nodes"][1]["id"] = json!(u32::MAX);
        assert!(matches!(
            Station::from_manifest_value(1, &value),
            Err(CoreError::InvalidManifestField { ref path, .. }) if path == "nodes[1].id"
        ));

        let mut value = serde_json::to_value(sample_station().to_manifest()).unwrap();
        value["rootFolder"]["subfolders"][0]["contents"][0]["id"] = json!(u32::MAX);
        assert!(matches!(
            Station::from_manifest_value(1, &value),
            Err(CoreError::InvalidManifestField { ref path, .. }) if path == "rootFolder"
        ));
    }

    #[test]
    fn test_exhausted_counter_fails_next_add() {
        let mut value = serde_json::to_value(sample_station().to_manifest()).unwrap();
        value["tagIdCounter"] = json!(u32::MAX);
        let mut station = Station::from_manifest_value(1, &value).unwrap();

        assert!(matches!(
            station.add_tag("Late"),
            Err(CoreError::IdsExhausted { kind: "tag" })
        ));
        assert_eq!(station.tag_id_counter, u32::MAX);
    }

    #[test]
    fn test_import_repairs_stale_counters() {
        let mut value = serde_json::to_value(sample_station().to_manifest()).unwrap();
        value["contentIdCounter"] = json!(0);
        value["folderIdCounter"] = json!(0);
        let station = Station::from_manifest_value(1, &value).unwrap();
        assert_eq!(station.content_id_counter, 1);
        assert_eq!(station.folder_id_counter, 2);
    }
}
