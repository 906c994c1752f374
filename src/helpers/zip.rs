//! ZIP archive helpers for Office Open XML (.xlsx) and OpenDocument (.ods) containers

use crate::error::Sheet2SqlError;
use crate::helpers::xml::XmlReader;
use std::io::BufReader;
use std::io::Read;
use std::io::Seek;
use zip::read::ZipFile;
use zip::result::ZipError;
use zip::ZipArchive;

/// Part lookup and reader creation on ZIP archives
pub(crate) trait ZipHelper<RS: Read + Seek> {
    /// Returns true if the archive holds a part with this name
    fn contains(&self, name: &str) -> bool;

    /// Gets a part by name (case-insensitive, path separator agnostic)
    fn file(&'_ mut self, name: &str) -> Result<Option<ZipFile<'_, RS>>, Sheet2SqlError>;

    /// Creates an XML reader over a part
    fn xml_reader(&'_ mut self, name: &str) -> Result<Option<XmlReader<BufReader<ZipFile<'_, RS>>>>, Sheet2SqlError>;
}

impl<RS: Read + Seek> ZipHelper<RS> for ZipArchive<RS> {
    fn contains(&self, name: &str) -> bool {
        let pattern = name.replace('\\', "/");
        self.file_names().any(|file_name| pattern.eq_ignore_ascii_case(file_name))
    }

    fn file(&'_ mut self, name: &str) -> Result<Option<ZipFile<'_, RS>>, Sheet2SqlError> {
        let pattern = name.replace('\\', "/");
        let path = self
            .file_names()
            .find(|file_name| pattern.eq_ignore_ascii_case(file_name))
            .map(|file_name| file_name.to_owned());
        match path.map(|file_name| self.by_name(&file_name)).transpose() {
            Ok(Some(file)) => Ok(Some(file)),
            Ok(None) | Err(ZipError::FileNotFound) => Ok(None),
            Err(error) => Err(error)?,
        }
    }

    fn xml_reader(&'_ mut self, name: &str) -> Result<Option<XmlReader<BufReader<ZipFile<'_, RS>>>>, Sheet2SqlError> {
        let reader = self.file(name)?.map(|file| XmlReader::new(BufReader::new(file)));
        Ok(reader)
    }
}
