//! Entities shared by the mapper integration tests.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use neomap_core::{EntityMetadata, FieldSpec, MappingError, PropertyValue};
use neomap_graph::MemoryGraph;
use neomap_mapper::{many, one, typed_many, typed_one, AnyEntity, Entity, EntityManager, EntityRef, EntityRegistry};

#[derive(Debug, Default)]
pub struct Person {
    pub id: Option<i64>,
    pub first_name: String,
    pub last_name: String,
}

impl Person {
    pub fn new(first_name: &str, last_name: &str) -> EntityRef<Self> {
        Self {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            ..Default::default()
        }
        .into_ref()
    }
}

impl Entity for Person {
    const NAME: &'static str = "Person";

    fn property(&self, field: &str) -> Option<PropertyValue> {
        match field {
            "id" => Some(self.id.into()),
            "first_name" => Some(self.first_name.as_str().into()),
            "last_name" => Some(self.last_name.as_str().into()),
            _ => None,
        }
    }

    fn set_property(&mut self, field: &str, value: PropertyValue) -> Result<(), MappingError> {
        match field {
            "id" => self.id = value.extract(Self::NAME, field)?,
            "first_name" => self.first_name = value.extract(Self::NAME, field)?,
            "last_name" => self.last_name = value.extract(Self::NAME, field)?,
            _ => return Err(MappingError::field_access(Self::NAME, field)),
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct Movie {
    pub id: Option<i64>,
    pub title: String,
    pub movie_registry_code: Option<String>,
    pub release_date: Option<DateTime<Utc>>,
    pub actors: Vec<EntityRef<Person>>,
    pub main_actor: Option<EntityRef<Person>>,
    pub cinemas: Vec<EntityRef<Cinema>>,
}

impl Movie {
    pub fn titled(title: &str) -> EntityRef<Self> {
        Self {
            title: title.to_string(),
            ..Default::default()
        }
        .into_ref()
    }
}

impl Entity for Movie {
    const NAME: &'static str = "Movie";

    fn property(&self, field: &str) -> Option<PropertyValue> {
        match field {
            "id" => Some(self.id.into()),
            "title" => Some(self.title.as_str().into()),
            "movie_registry_code" => Some(self.movie_registry_code.clone().into()),
            "release_date" => Some(self.release_date.into()),
            _ => None,
        }
    }

    fn set_property(&mut self, field: &str, value: PropertyValue) -> Result<(), MappingError> {
        match field {
            "id" => self.id = value.extract(Self::NAME, field)?,
            "title" => self.title = value.extract(Self::NAME, field)?,
            "movie_registry_code" => self.movie_registry_code = value.extract(Self::NAME, field)?,
            "release_date" => self.release_date = value.extract(Self::NAME, field)?,
            _ => return Err(MappingError::field_access(Self::NAME, field)),
        }
        Ok(())
    }

    fn relation(&self, field: &str) -> Option<Vec<AnyEntity>> {
        match field {
            "actors" => Some(many(&self.actors)),
            "main_actor" => Some(one(&self.main_actor)),
            "cinemas" => Some(many(&self.cinemas)),
            _ => None,
        }
    }

    fn set_relation(&mut self, field: &str, targets: Vec<AnyEntity>) -> Result<(), MappingError> {
        match field {
            "actors" => self.actors = typed_many(targets)?,
            "main_actor" => self.main_actor = typed_one(targets)?,
            "cinemas" => self.cinemas = typed_many(targets)?,
            _ => return Err(MappingError::field_access(Self::NAME, field)),
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct Cinema {
    pub id: Option<i64>,
    pub name: String,
    pub presented_movies: Vec<EntityRef<Movie>>,
    pub rejected_movies: Vec<EntityRef<Movie>>,
}

impl Cinema {
    pub fn named(name: &str) -> EntityRef<Self> {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
        .into_ref()
    }
}

impl Entity for Cinema {
    const NAME: &'static str = "Cinema";

    fn property(&self, field: &str) -> Option<PropertyValue> {
        match field {
            "id" => Some(self.id.into()),
            "name" => Some(self.name.as_str().into()),
            _ => None,
        }
    }

    fn set_property(&mut self, field: &str, value: PropertyValue) -> Result<(), MappingError> {
        match field {
            "id" => self.id = value.extract(Self::NAME, field)?,
            "name" => self.name = value.extract(Self::NAME, field)?,
            _ => return Err(MappingError::field_access(Self::NAME, field)),
        }
        Ok(())
    }

    fn relation(&self, field: &str) -> Option<Vec<AnyEntity>> {
        match field {
            "presented_movies" => Some(many(&self.presented_movies)),
            "rejected_movies" => Some(many(&self.rejected_movies)),
            _ => None,
        }
    }

    fn set_relation(&mut self, field: &str, targets: Vec<AnyEntity>) -> Result<(), MappingError> {
        match field {
            "presented_movies" => self.presented_movies = typed_many(targets)?,
            "rejected_movies" => self.rejected_movies = typed_many(targets)?,
            _ => return Err(MappingError::field_access(Self::NAME, field)),
        }
        Ok(())
    }
}

/// Registered, but declares no identity field.
#[derive(Debug, Default)]
pub struct FailedEntity {
    pub name: String,
}

impl Entity for FailedEntity {
    const NAME: &'static str = "FailedEntity";

    fn property(&self, field: &str) -> Option<PropertyValue> {
        (field == "name").then(|| self.name.as_str().into())
    }

    fn set_property(&mut self, field: &str, value: PropertyValue) -> Result<(), MappingError> {
        match field {
            "name" => self.name = value.extract(Self::NAME, field)?,
            _ => return Err(MappingError::field_access(Self::NAME, field)),
        }
        Ok(())
    }
}

/// Never registered.
#[derive(Debug, Default)]
pub struct Unregistered {
    pub id: Option<i64>,
}

impl Entity for Unregistered {
    const NAME: &'static str = "Unregistered";

    fn property(&self, field: &str) -> Option<PropertyValue> {
        (field == "id").then(|| self.id.into())
    }

    fn set_property(&mut self, field: &str, value: PropertyValue) -> Result<(), MappingError> {
        match field {
            "id" => self.id = value.extract(Self::NAME, field)?,
            _ => return Err(MappingError::field_access(Self::NAME, field)),
        }
        Ok(())
    }
}

pub fn movie_metadata() -> EntityMetadata {
    EntityMetadata::builder("Movie")
        .identity("id")
        .scalar("title")
        .indexed("movie_registry_code")
        .date("release_date")
        .to_many("actors", "Person")
        .to_one("main_actor", "Person")
        .field(
            FieldSpec::to_many("cinemas", "Cinema")
                .read_only()
                .incoming()
                .relation("presented_movies"),
        )
        .build()
        .unwrap()
}

pub fn person_metadata() -> EntityMetadata {
    EntityMetadata::builder("Person")
        .identity("id")
        .scalar("first_name")
        .scalar("last_name")
        .build()
        .unwrap()
}

pub fn cinema_metadata() -> EntityMetadata {
    EntityMetadata::builder("Cinema")
        .identity("id")
        .scalar("name")
        .to_many("presented_movies", "Movie")
        .field(FieldSpec::to_many("rejected_movies", "Movie").write_only())
        .build()
        .unwrap()
}

pub fn registry() -> EntityRegistry {
    let failed = EntityMetadata::builder("FailedEntity")
        .scalar("name")
        .build()
        .unwrap();

    let mut registry = EntityRegistry::new();
    registry
        .register::<Movie>(movie_metadata())
        .unwrap()
        .register::<Person>(person_metadata())
        .unwrap()
        .register::<Cinema>(cinema_metadata())
        .unwrap()
        .register::<FailedEntity>(failed)
        .unwrap();
    registry
}

/// A fresh session over `graph`. Sessions over clones of one graph see the
/// same data but never share instances.
pub fn manager(graph: &MemoryGraph) -> EntityManager<MemoryGraph> {
    EntityManager::new(graph.clone(), registry()).unwrap()
}

pub fn title(movie: &EntityRef<Movie>) -> String {
    movie.borrow().title.clone()
}

pub fn first_names(people: &[EntityRef<Person>]) -> Vec<String> {
    people.iter().map(|p| p.borrow().first_name.clone()).collect()
}
