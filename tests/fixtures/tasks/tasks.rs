//! Task endpoints nested under projects.
//!
//! @OA\Tag(name="Tasks", description="Task tracking")

/// A unit of work inside a project.
///
/// @OA\Schema(schema="Task")
pub struct Task {
    /// @OA\Property(required=true)
    pub id: u64,
    /// @OA\Property(description="Short title")
    pub title: String,
    /// @OA\Property
    pub project: Option<Project>,
    /// @OA\Property
    pub labels: Vec<String>,
}

pub struct TaskHandlers;

impl TaskHandlers {
    /// @OA\Get(
    ///     path="/projects/{project}/tasks",
    ///     tags={"Tasks"},
    ///     @OA\Parameter(name="project", in="path", required=true, @OA\Schema(type="integer")),
    ///     @OA\Response(
    ///         response=200,
    ///         description="Tasks of the project",
    ///         @OA\JsonContent(type="array", @OA\Items(ref="Task"))
    ///     )
    /// )
    pub fn list_tasks() {}
}
