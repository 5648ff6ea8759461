//! Structured models for the SpreadsheetML parts the package layer re-encodes on save.

mod calc_chain;
mod comments;
mod content_types;
mod drawing;
mod relationships;
mod shared_strings;
mod styles;
mod theme;
mod vml;
mod workbook;
mod worksheet;
pub mod xml;

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub use calc_chain::{CalcCell, CalcChain};
pub use comments::{Comment, Comments};
pub use content_types::{ContentTypes, DefaultType, OverrideType};
pub use drawing::Drawing;
pub use relationships::{rels_part_name, resolve_target, Relationship, Relationships};
pub use shared_strings::SharedStrings;
pub use styles::StyleSheet;
pub use theme::Theme;
pub use vml::VmlDrawing;
pub use workbook::{SheetEntry, Workbook};
pub use worksheet::{
    format_a1, parse_a1, Cell, CellValue, InvalidCellReference, Row, Worksheet, MAX_COLUMNS,
    MAX_ROWS,
};
pub(crate) use worksheet::write_row;
pub use xml::{XmlElement, XmlError, XmlNode};

pub use content_types::content_type;
pub use relationships::rel_type;

pub const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
pub const ROOT_RELS_PART: &str = "_rels/.rels";
pub const WORKBOOK_PART: &str = "xl/workbook.xml";
pub const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
pub const STYLES_PART: &str = "xl/styles.xml";
pub const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";
pub const CALC_CHAIN_PART: &str = "xl/calcChain.xml";
pub const THEME_PART: &str = "xl/theme/theme1.xml";

/// The structured part kinds. Declaration order is the commit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PartKind {
    CalcChain,
    Comments,
    ContentTypes,
    Drawing,
    VmlDrawing,
    Workbook,
    Worksheet,
    Relationships,
    SharedStrings,
    Styles,
    Theme,
}

impl PartKind {
    pub const COMMIT_ORDER: [PartKind; 11] = [
        PartKind::CalcChain,
        PartKind::Comments,
        PartKind::ContentTypes,
        PartKind::Drawing,
        PartKind::VmlDrawing,
        PartKind::Workbook,
        PartKind::Worksheet,
        PartKind::Relationships,
        PartKind::SharedStrings,
        PartKind::Styles,
        PartKind::Theme,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PartKind::CalcChain => "calcChain",
            PartKind::Comments => "comments",
            PartKind::ContentTypes => "contentTypes",
            PartKind::Drawing => "drawing",
            PartKind::VmlDrawing => "vmlDrawing",
            PartKind::Workbook => "workbook",
            PartKind::Worksheet => "worksheet",
            PartKind::Relationships => "relationships",
            PartKind::SharedStrings => "sharedStrings",
            PartKind::Styles => "styles",
            PartKind::Theme => "theme",
        }
    }

    /// Optional kinds are left out of the container when their model is empty.
    pub fn is_optional(self) -> bool {
        matches!(
            self,
            PartKind::CalcChain
                | PartKind::Comments
                | PartKind::Drawing
                | PartKind::VmlDrawing
                | PartKind::Relationships
                | PartKind::SharedStrings
        )
    }
}

impl fmt::Display for PartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decoder/encoder pair for one part kind.
pub trait PartCodec: Sized + Default + Send + Sync + 'static {
    const KIND: PartKind;

    fn decode(bytes: &[u8]) -> Result<Self, XmlError>;

    fn encode(&self) -> Result<Vec<u8>, XmlError>;

    /// `true` when the part should not be written at all.
    fn is_omitted(&self) -> bool {
        false
    }
}

/// Shared, lockable handle to a decoded part model.
///
/// Handles stay valid across saves; the commit pipeline re-encodes whatever the model holds at
/// write time. Drop write guards before writing the document.
pub struct PartHandle<T>(Arc<RwLock<T>>);

impl<T> PartHandle<T> {
    pub(crate) fn new(value: T) -> Self {
        Self(Arc::new(RwLock::new(value)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T> Clone for PartHandle<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: fmt::Debug> fmt::Debug for PartHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_read() {
            Ok(model) => f.debug_tuple("PartHandle").field(&*model).finish(),
            Err(_) => f.write_str("PartHandle(<locked>)"),
        }
    }
}

/// Maps a model type to its [`PartModel`] variant.
pub(crate) trait ModelSlot: PartCodec {
    fn into_model(handle: PartHandle<Self>) -> PartModel;
    fn from_model(model: &PartModel) -> Option<PartHandle<Self>>;
}

macro_rules! part_models {
    ($($variant:ident => $ty:ty),+ $(,)?) => {
        /// A decoded part, tagged by kind.
        #[derive(Debug, Clone)]
        pub enum PartModel {
            $($variant(PartHandle<$ty>),)+
        }

        impl PartModel {
            pub fn kind(&self) -> PartKind {
                match self {
                    $(PartModel::$variant(_) => PartKind::$variant,)+
                }
            }

            /// Whether both wrap the same shared model.
            pub(crate) fn same_handle(&self, other: &PartModel) -> bool {
                match (self, other) {
                    $((PartModel::$variant(a), PartModel::$variant(b)) => a.ptr_eq(b),)+
                    _ => false,
                }
            }

            /// Encode the current model state; `None` when the part is omitted.
            pub(crate) fn encode(&self) -> Result<Option<Vec<u8>>, XmlError> {
                match self {
                    $(PartModel::$variant(handle) => {
                        let model = handle.read();
                        if model.is_omitted() {
                            Ok(None)
                        } else {
                            model.encode().map(Some)
                        }
                    })+
                }
            }
        }

        $(
            impl ModelSlot for $ty {
                fn into_model(handle: PartHandle<Self>) -> PartModel {
                    PartModel::$variant(handle)
                }

                fn from_model(model: &PartModel) -> Option<PartHandle<Self>> {
                    match model {
                        PartModel::$variant(handle) => Some(handle.clone()),
                        _ => None,
                    }
                }
            }
        )+
    };
}

part_models! {
    CalcChain => CalcChain,
    Comments => Comments,
    ContentTypes => ContentTypes,
    Drawing => Drawing,
    VmlDrawing => VmlDrawing,
    Workbook => Workbook,
    Worksheet => Worksheet,
    Relationships => Relationships,
    SharedStrings => SharedStrings,
    Styles => StyleSheet,
    Theme => Theme,
}
